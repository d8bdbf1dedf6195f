//! Sessions and plugin handles.
//!
//! A [`Session`] is created by [`Gateway::create`](crate::gateway::Gateway::create) and a
//! [`Handle`] by [`Session::attach`]. Both keep only a weak reference to the connection, so
//! holding one does not keep the socket open; once the gateway is gone every call fails with
//! [`GatewayError::ConnectionClosed`].

use crate::error::GatewayError;
use crate::gateway::connection::Shared;
use crate::gateway::protocol::{EventMsg, Message, PluginData};
use crate::gateway::queue::EventQueue;
use crate::gateway::registry::TransactionKind;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Default interval for [`Session::spawn_keep_alive`]; Janus expires idle sessions after 60s.
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(20);

#[derive(Clone)]
pub struct Session {
    id: u64,
    shared: Weak<Shared>,
    events: Arc<EventQueue>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("id", &self.id).finish()
    }
}

fn upgrade(shared: &Weak<Shared>) -> Result<Arc<Shared>, GatewayError> {
    shared.upgrade().ok_or(GatewayError::ConnectionClosed)
}

impl Session {
    pub(crate) fn new(shared: Weak<Shared>, id: u64, events: Arc<EventQueue>) -> Self {
        Self { id, shared, events }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// `attach`: open a handle to `plugin` inside this session.
    pub async fn attach(&self, plugin: &str) -> Result<Handle, GatewayError> {
        let shared = upgrade(&self.shared)?;
        let mut fields = Map::new();
        fields.insert("session_id".into(), json!(self.id));
        fields.insert("plugin".into(), json!(plugin));
        let mut txn = shared
            .transact("attach", fields, TransactionKind::Single)
            .await?;
        let success = match txn.recv().await? {
            Message::Success(s) => s,
            Message::Error(e) => return Err(e.into_error()),
            other => return Err(GatewayError::unexpected("attach", other.kind().as_str())),
        };
        let id = success
            .data
            .ok_or_else(|| GatewayError::unexpected("attach", "success without data.id"))?
            .id;
        let events = shared
            .registry
            .add_handle(self.id, id)
            .ok_or(GatewayError::ConnectionClosed)?;
        log::debug!("session {}: attached handle {} to {}", self.id, id, plugin);
        Ok(Handle {
            id,
            session_id: self.id,
            plugin: plugin.to_string(),
            shared: self.shared.clone(),
            events,
        })
    }

    /// `keepalive`: refresh the session on the server. Not retried on failure.
    pub async fn keep_alive(&self) -> Result<(), GatewayError> {
        let shared = upgrade(&self.shared)?;
        let mut fields = Map::new();
        fields.insert("session_id".into(), json!(self.id));
        let mut txn = shared
            .transact("keepalive", fields, TransactionKind::Single)
            .await?;
        match txn.recv().await? {
            Message::Ack(_) => Ok(()),
            Message::Error(e) => Err(e.into_error()),
            other => Err(GatewayError::unexpected("keepalive", other.kind().as_str())),
        }
    }

    /// Run [`keep_alive`](Self::keep_alive) every `every` on its own task. The task stops at
    /// the first failure and returns it.
    pub fn spawn_keep_alive(&self, every: Duration) -> JoinHandle<GatewayError> {
        let session = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = session.keep_alive().await {
                    log::warn!("session {}: keepalive failed, stopping: {}", session.id, e);
                    return e;
                }
            }
        })
    }

    /// `destroy`: end the session on the server and drop its handles locally.
    pub async fn destroy(&self) -> Result<(), GatewayError> {
        let shared = upgrade(&self.shared)?;
        let mut fields = Map::new();
        fields.insert("session_id".into(), json!(self.id));
        let mut txn = shared
            .transact("destroy", fields, TransactionKind::Single)
            .await?;
        match txn.recv().await? {
            Message::Success(_) => {
                shared.registry.remove_session(self.id);
                log::debug!("session {}: destroyed", self.id);
                Ok(())
            }
            Message::Error(e) => Err(e.into_error()),
            other => Err(GatewayError::unexpected("destroy", other.kind().as_str())),
        }
    }

    /// Next session-scoped event (e.g. `timeout`). `None` once the session is gone.
    pub async fn next_event(&self) -> Option<Message> {
        self.events.recv().await
    }

    pub fn try_next_event(&self) -> Option<Message> {
        self.events.try_recv()
    }
}

/// A plugin handle inside a session.
#[derive(Clone)]
pub struct Handle {
    id: u64,
    session_id: u64,
    plugin: String,
    shared: Weak<Shared>,
    events: Arc<EventQueue>,
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("id", &self.id)
            .field("session_id", &self.session_id)
            .field("plugin", &self.plugin)
            .finish()
    }
}

impl Handle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    fn address(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("session_id".into(), json!(self.session_id));
        fields.insert("handle_id".into(), json!(self.id));
        fields
    }

    /// Synchronous plugin request: one `message` round trip answered by `success` with
    /// `plugindata`.
    pub async fn request<B: Serialize + ?Sized>(
        &self,
        body: &B,
    ) -> Result<PluginData, GatewayError> {
        let shared = upgrade(&self.shared)?;
        let mut fields = self.address();
        fields.insert(
            "body".into(),
            serde_json::to_value(body).map_err(GatewayError::Encode)?,
        );
        let mut txn = shared
            .transact("message", fields, TransactionKind::Single)
            .await?;
        match txn.recv().await? {
            Message::Success(s) => s
                .plugindata
                .ok_or_else(|| GatewayError::unexpected("message", "success without plugindata")),
            Message::Error(e) => Err(e.into_error()),
            other => Err(GatewayError::unexpected("message", other.kind().as_str())),
        }
    }

    /// Asynchronous plugin request, optionally carrying a session description. Janus acks it
    /// first and answers later with an `event` on the same transaction, which is returned.
    pub async fn message<B: Serialize + ?Sized>(
        &self,
        body: &B,
        jsep: Option<Value>,
    ) -> Result<EventMsg, GatewayError> {
        let shared = upgrade(&self.shared)?;
        let mut fields = self.address();
        fields.insert(
            "body".into(),
            serde_json::to_value(body).map_err(GatewayError::Encode)?,
        );
        if let Some(jsep) = jsep {
            fields.insert("jsep".into(), jsep);
        }
        let mut txn = shared
            .transact("message", fields, TransactionKind::KeptAlive)
            .await?;
        loop {
            match txn.recv().await? {
                Message::Ack(_) => continue,
                Message::Event(ev) => return Ok(ev),
                Message::Error(e) => return Err(e.into_error()),
                other => return Err(GatewayError::unexpected("message", other.kind().as_str())),
            }
        }
    }

    /// `detach`: close the handle on the server and stop routing its events.
    pub async fn detach(&self) -> Result<(), GatewayError> {
        let shared = upgrade(&self.shared)?;
        let mut txn = shared
            .transact("detach", self.address(), TransactionKind::Single)
            .await?;
        match txn.recv().await? {
            Message::Success(_) => {
                shared.registry.remove_handle(self.session_id, self.id);
                log::debug!("session {}: detached handle {}", self.session_id, self.id);
                Ok(())
            }
            Message::Error(e) => Err(e.into_error()),
            other => Err(GatewayError::unexpected("detach", other.kind().as_str())),
        }
    }

    /// Next unsolicited event for this handle (plugin events, media state, hangup, ...).
    /// `None` once the handle is detached or the connection is gone.
    pub async fn next_event(&self) -> Option<Message> {
        self.events.recv().await
    }

    pub fn try_next_event(&self) -> Option<Message> {
        self.events.try_recv()
    }
}
