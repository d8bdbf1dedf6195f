//! Transaction correlator and session/handle registry for one connection.
//!
//! All routing state (pending transactions, their used-flags, sessions and their handles)
//! lives behind a single lock. Callers only see register / route / remove operations; the
//! maps themselves never leave this module.

use crate::error::GatewayError;
use crate::gateway::lock;
use crate::gateway::protocol::{Envelope, Message};
use crate::gateway::queue::{EventQueue, OverflowPolicy};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// How many replies a transaction expects before it is retired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionKind {
    /// One reply. An `ack` reply marks the transaction used; the event that follows with the
    /// same id is routed to the session/handle queue instead of the waiter.
    Single,
    /// Replies keep flowing to the waiter while they are `ack`s; the first non-ack is terminal.
    KeptAlive,
}

impl TransactionKind {
    fn waiter_capacity(self) -> usize {
        match self {
            Self::Single => 1,
            Self::KeptAlive => 4,
        }
    }
}

struct Pending {
    waiter: mpsc::Sender<Message>,
    kind: TransactionKind,
    /// Set when an ack consumed a `Single` transaction.
    used_at: Option<Instant>,
}

struct HandleEntry {
    events: Arc<EventQueue>,
}

struct SessionEntry {
    events: Arc<EventQueue>,
    handles: HashMap<u64, HandleEntry>,
}

#[derive(Default)]
struct RegistryState {
    transactions: HashMap<String, Pending>,
    sessions: HashMap<u64, SessionEntry>,
    closed: bool,
}

/// Where an inbound message goes.
#[derive(Debug)]
pub enum Route {
    Waiter {
        transaction: String,
        waiter: mpsc::Sender<Message>,
    },
    Handle {
        session: u64,
        handle: u64,
        events: Arc<EventQueue>,
    },
    Session {
        session: u64,
        events: Arc<EventQueue>,
    },
    Drop(DropReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    Closed,
    NoSession,
    UnknownSession(u64),
    UnknownHandle { session: u64, handle: u64 },
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "connection closed"),
            Self::NoSession => write!(f, "no transaction or session to route to"),
            Self::UnknownSession(s) => write!(f, "session {} gone?", s),
            Self::UnknownHandle { session, handle } => {
                write!(f, "handle {} gone? (session {})", handle, session)
            }
        }
    }
}

enum TransactionMatch {
    Deliver(mpsc::Sender<Message>, bool),
    Used,
    Unregistered,
}

pub struct Registry {
    state: Mutex<RegistryState>,
    queue_capacity: usize,
    overflow: OverflowPolicy,
    used_linger: Duration,
}

impl Registry {
    pub fn new(queue_capacity: usize, overflow: OverflowPolicy, used_linger: Duration) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            queue_capacity,
            overflow,
            used_linger,
        }
    }

    /// Register a new transaction under a fresh id; returns the id and the waiter.
    pub fn register(
        &self,
        kind: TransactionKind,
    ) -> Result<(String, mpsc::Receiver<Message>), GatewayError> {
        self.register_with(kind, || uuid::Uuid::new_v4().to_string())
    }

    fn register_with(
        &self,
        kind: TransactionKind,
        mut next_id: impl FnMut() -> String,
    ) -> Result<(String, mpsc::Receiver<Message>), GatewayError> {
        let mut st = lock(&self.state);
        if st.closed {
            return Err(GatewayError::ConnectionClosed);
        }
        let linger = self.used_linger;
        let now = Instant::now();
        st.transactions
            .retain(|_, p| p.used_at.map_or(true, |t| now.duration_since(t) < linger));

        let mut id = next_id();
        while st.transactions.contains_key(&id) {
            id = next_id();
        }
        let (tx, rx) = mpsc::channel(kind.waiter_capacity());
        st.transactions.insert(
            id.clone(),
            Pending {
                waiter: tx,
                kind,
                used_at: None,
            },
        );
        Ok((id, rx))
    }

    /// Drop a registration whose caller gave up (timeout, cancellation, send failure).
    /// A used registration is left in place: its follow-up event is still expected.
    pub fn release(&self, id: &str) {
        let mut st = lock(&self.state);
        if st.transactions.get(id).is_some_and(|p| p.used_at.is_none()) {
            st.transactions.remove(id);
        }
    }

    /// Routing decision for one inbound message. Mutates transaction state; delivery is left
    /// to the caller so no lock is held while delivering.
    pub fn route(&self, envelope: &Envelope, msg: &Message) -> Route {
        let mut st = lock(&self.state);
        if st.closed {
            return Route::Drop(DropReason::Closed);
        }
        let state = &mut *st;

        if let Some(id) = envelope.transaction.as_deref() {
            let found = match state.transactions.get_mut(id) {
                Some(p) if p.used_at.is_none() => {
                    let keep = msg.is_ack();
                    if keep && p.kind == TransactionKind::Single {
                        p.used_at = Some(Instant::now());
                    }
                    TransactionMatch::Deliver(p.waiter.clone(), keep)
                }
                Some(_) => TransactionMatch::Used,
                None => TransactionMatch::Unregistered,
            };
            match found {
                TransactionMatch::Deliver(waiter, keep) => {
                    if !keep {
                        state.transactions.remove(id);
                    }
                    return Route::Waiter {
                        transaction: id.to_string(),
                        waiter,
                    };
                }
                TransactionMatch::Used => {
                    // The ack already went to the waiter; this is the follow-up event.
                    state.transactions.remove(id);
                }
                TransactionMatch::Unregistered => {}
            }
        }

        let Some(session_id) = envelope.session_id else {
            return Route::Drop(DropReason::NoSession);
        };
        let Some(session) = state.sessions.get(&session_id) else {
            return Route::Drop(DropReason::UnknownSession(session_id));
        };
        match envelope.sender {
            Some(handle_id) => match session.handles.get(&handle_id) {
                Some(h) => Route::Handle {
                    session: session_id,
                    handle: handle_id,
                    events: Arc::clone(&h.events),
                },
                None => Route::Drop(DropReason::UnknownHandle {
                    session: session_id,
                    handle: handle_id,
                }),
            },
            None => Route::Session {
                session: session_id,
                events: Arc::clone(&session.events),
            },
        }
    }

    /// Register a session created by the server; returns its event queue.
    pub fn add_session(&self, session_id: u64) -> Arc<EventQueue> {
        let events = Arc::new(EventQueue::new(self.queue_capacity, self.overflow));
        let mut st = lock(&self.state);
        if st.closed {
            events.close();
            return events;
        }
        let old = st.sessions.insert(
            session_id,
            SessionEntry {
                events: Arc::clone(&events),
                handles: HashMap::new(),
            },
        );
        drop(st);
        if let Some(old) = old {
            close_session(&old);
        }
        events
    }

    /// Unregister a session and close its queues and those of its handles.
    pub fn remove_session(&self, session_id: u64) {
        let removed = lock(&self.state).sessions.remove(&session_id);
        if let Some(entry) = removed {
            close_session(&entry);
        }
    }

    /// Register a handle under its session; `None` when the session is unknown.
    pub fn add_handle(&self, session_id: u64, handle_id: u64) -> Option<Arc<EventQueue>> {
        let events = Arc::new(EventQueue::new(self.queue_capacity, self.overflow));
        let mut st = lock(&self.state);
        let session = st.sessions.get_mut(&session_id)?;
        let old = session.handles.insert(
            handle_id,
            HandleEntry {
                events: Arc::clone(&events),
            },
        );
        drop(st);
        if let Some(old) = old {
            old.events.close();
        }
        Some(events)
    }

    pub fn remove_handle(&self, session_id: u64, handle_id: u64) {
        let removed = lock(&self.state)
            .sessions
            .get_mut(&session_id)
            .and_then(|s| s.handles.remove(&handle_id));
        if let Some(entry) = removed {
            entry.events.close();
        }
    }

    /// Connection is gone: fail every waiter, close every queue, refuse new registrations.
    pub fn close_all(&self) {
        let (transactions, sessions) = {
            let mut st = lock(&self.state);
            st.closed = true;
            (
                std::mem::take(&mut st.transactions),
                std::mem::take(&mut st.sessions),
            )
        };
        drop(transactions);
        for entry in sessions.values() {
            close_session(entry);
        }
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.state).transactions.len()
    }

    pub fn session_count(&self) -> usize {
        lock(&self.state).sessions.len()
    }
}

fn close_session(entry: &SessionEntry) {
    entry.events.close();
    for h in entry.handles.values() {
        h.events.close();
    }
}
