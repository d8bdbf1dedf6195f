//! Bounded inbound event queue for a session or handle.
//!
//! The read loop pushes, the owner of the session/handle pops. What happens when the owner
//! stops draining is decided by [`OverflowPolicy`].

use crate::gateway::lock;
use crate::gateway::protocol::Message;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::Notify;

/// What the read loop does when a queue is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OverflowPolicy {
    /// Wait for the consumer to make room. Stalls the read loop, and with it every other
    /// transaction on the connection, until the consumer catches up.
    Block,
    /// Discard the oldest queued event to make room for the new one.
    #[default]
    DropOldest,
}

struct QueueState {
    items: VecDeque<Message>,
    closed: bool,
}

pub struct EventQueue {
    state: Mutex<QueueState>,
    capacity: usize,
    policy: OverflowPolicy,
    readable: Notify,
    writable: Notify,
}

impl std::fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventQueue")
            .field("capacity", &self.capacity)
            .field("policy", &self.policy)
            .field("len", &self.len())
            .finish()
    }
}

impl EventQueue {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            capacity,
            policy,
            readable: Notify::new(),
            writable: Notify::new(),
        }
    }

    /// Enqueue an event. Returns false when the queue has been closed and the event was dropped.
    pub async fn push(&self, msg: Message) -> bool {
        loop {
            let space = self.writable.notified();
            {
                let mut st = lock(&self.state);
                if st.closed {
                    return false;
                }
                if st.items.len() < self.capacity {
                    st.items.push_back(msg);
                    drop(st);
                    self.readable.notify_one();
                    return true;
                }
                if self.policy == OverflowPolicy::DropOldest {
                    let dropped = st.items.pop_front();
                    st.items.push_back(msg);
                    drop(st);
                    if let Some(old) = dropped {
                        log::warn!(
                            "queue: full ({}), dropped oldest '{}' event",
                            self.capacity,
                            old.kind().as_str()
                        );
                    }
                    self.readable.notify_one();
                    return true;
                }
            }
            space.await;
        }
    }

    /// Wait for the next event. Returns `None` once the queue is closed and drained.
    pub async fn recv(&self) -> Option<Message> {
        loop {
            let ready = self.readable.notified();
            {
                let mut st = lock(&self.state);
                if let Some(msg) = st.items.pop_front() {
                    drop(st);
                    self.writable.notify_one();
                    return Some(msg);
                }
                if st.closed {
                    return None;
                }
            }
            ready.await;
        }
    }

    pub fn try_recv(&self) -> Option<Message> {
        let msg = lock(&self.state).items.pop_front();
        if msg.is_some() {
            self.writable.notify_one();
        }
        msg
    }

    /// Stop accepting events; queued events can still be drained.
    pub fn close(&self) {
        lock(&self.state).closed = true;
        self.readable.notify_waiters();
        self.writable.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }

    pub fn len(&self) -> usize {
        lock(&self.state).items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
