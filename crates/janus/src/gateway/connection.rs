//! One WebSocket connection to a Janus instance.
//!
//! The connection owns a single read loop (the only consumer of inbound frames), a write path
//! serialized by an async mutex around the sink, and a ping probe. Fatal socket errors are
//! reported once on the error channel handed out by [`Gateway::take_errors`].

use crate::error::GatewayError;
use crate::gateway::lock;
use crate::gateway::protocol::{
    self, Message, OutgoingRequest, ServerInfoMsg, ADMIN_SUBPROTOCOL, SUBPROTOCOL,
};
use crate::gateway::queue::OverflowPolicy;
use crate::gateway::registry::{Registry, Route, TransactionKind};
use crate::gateway::session::Session;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const ERROR_CHANNEL_CAPACITY: usize = 8;

/// Frames the read loop buffers while a dispatch waits on a full queue. Past this the socket
/// is no longer read and transport loss is only seen by the ping probe.
const READ_BACKLOG: usize = 64;

/// Which Janus API the connection speaks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolVariant {
    Standard,
    /// Admin API; every request carries the shared secret.
    Admin { secret: String },
}

impl ProtocolVariant {
    pub fn subprotocol(&self) -> &'static str {
        match self {
            Self::Standard => SUBPROTOCOL,
            Self::Admin { .. } => ADMIN_SUBPROTOCOL,
        }
    }

    fn admin_secret(&self) -> Option<String> {
        match self {
            Self::Standard => None,
            Self::Admin { secret } => Some(secret.clone()),
        }
    }
}

/// Timing and queueing knobs for a connection.
#[derive(Debug, Clone)]
pub struct GatewayOptions {
    /// Interval between WebSocket pings.
    pub ping_interval: Duration,
    /// Deadline for each reply; `None` waits forever.
    pub request_timeout: Option<Duration>,
    /// How long a transaction consumed by an ack waits for its follow-up event.
    pub used_linger: Duration,
    pub queue_capacity: usize,
    pub overflow: OverflowPolicy,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            request_timeout: Some(Duration::from_secs(30)),
            used_linger: Duration::from_secs(60),
            queue_capacity: 64,
            overflow: OverflowPolicy::default(),
        }
    }
}

/// State shared by the gateway, its background tasks, sessions and handles.
pub(crate) struct Shared {
    pub(crate) registry: Registry,
    writer: tokio::sync::Mutex<SplitSink<WsStream, WsMessage>>,
    errors: mpsc::Sender<GatewayError>,
    /// Set by the first fatal report; later ones are only logged.
    reported: AtomicBool,
    shutdown: watch::Sender<bool>,
    variant: ProtocolVariant,
    options: GatewayOptions,
}

/// A pending request: yields the replies correlated with its transaction id.
///
/// Dropping it (after the reply, on timeout, or on cancellation) releases the registration.
/// The deadline is fixed when the request is sent and covers every reply, acks included.
pub(crate) struct Transaction {
    id: String,
    method: String,
    replies: mpsc::Receiver<Message>,
    deadline: Option<Instant>,
    shared: Arc<Shared>,
}

impl Transaction {
    pub(crate) async fn recv(&mut self) -> Result<Message, GatewayError> {
        let next = match self.deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, self.replies.recv())
                .await
                .map_err(|_| GatewayError::Timeout(self.method.clone()))?,
            None => self.replies.recv().await,
        };
        next.ok_or(GatewayError::ConnectionClosed)
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        self.shared.registry.release(&self.id);
    }
}

impl Shared {
    /// Register a transaction, then send `{janus: method, transaction, ...fields}`.
    pub(crate) async fn transact(
        self: &Arc<Self>,
        method: &str,
        fields: Map<String, Value>,
        kind: TransactionKind,
    ) -> Result<Transaction, GatewayError> {
        let (id, replies) = self.registry.register(kind)?;
        let txn = Transaction {
            id: id.clone(),
            method: method.to_string(),
            replies,
            deadline: self.options.request_timeout.map(|limit| Instant::now() + limit),
            shared: Arc::clone(self),
        };
        let req = OutgoingRequest {
            janus: method.to_string(),
            transaction: id,
            admin_secret: self.variant.admin_secret(),
            fields,
        };
        let frame = serde_json::to_string(&req).map_err(GatewayError::Encode)?;
        self.send_text(frame).await?;
        Ok(txn)
    }

    async fn send_text(&self, frame: String) -> Result<(), GatewayError> {
        if self.registry.is_closed() {
            return Err(GatewayError::ConnectionClosed);
        }
        log::trace!("gateway: > {}", frame);
        let result = self.writer.lock().await.send(WsMessage::Text(frame)).await;
        result.map_err(|e| {
            let text = e.to_string();
            self.report(GatewayError::Io(e));
            GatewayError::SendFailed(text)
        })
    }

    /// Best-effort report on the error channel; never waits for a reader. Only the first
    /// fatal error of the connection is delivered.
    fn report(&self, err: GatewayError) {
        if self.reported.swap(true, Ordering::SeqCst) {
            log::debug!("gateway: already reported a fatal error, dropping: {}", err);
            return;
        }
        if let Err(e) = self.errors.try_send(err) {
            let err = match e {
                mpsc::error::TrySendError::Full(err) | mpsc::error::TrySendError::Closed(err) => err,
            };
            log::warn!("gateway: error not collected: {}", err);
        }
    }

    async fn dispatch(&self, text: &str) {
        log::trace!("gateway: < {}", text);
        let (envelope, msg) = match protocol::decode(text) {
            Ok(decoded) => decoded,
            Err(e) => {
                log::warn!("gateway: dropping inbound frame: {}", e);
                return;
            }
        };
        let kind = msg.kind();
        match self.registry.route(&envelope, &msg) {
            Route::Waiter {
                transaction,
                waiter,
            } => {
                if let Err(e) = waiter.try_send(msg) {
                    log::debug!(
                        "gateway: waiter for {} not receiving '{}': {}",
                        transaction,
                        kind.as_str(),
                        e
                    );
                }
            }
            Route::Handle {
                session,
                handle,
                events,
            } => {
                if !events.push(msg).await {
                    log::debug!(
                        "gateway: handle {} (session {}) closed, dropped '{}'",
                        handle,
                        session,
                        kind.as_str()
                    );
                }
            }
            Route::Session { session, events } => {
                if !events.push(msg).await {
                    log::debug!("gateway: session {} closed, dropped '{}'", session, kind.as_str());
                }
            }
            Route::Drop(reason) => {
                log::debug!("gateway: unable to deliver '{}': {}", kind.as_str(), reason);
            }
        }
    }
}

/// Client side of one Janus connection.
pub struct Gateway {
    shared: Arc<Shared>,
    errors: Mutex<Option<mpsc::Receiver<GatewayError>>>,
    read_task: Mutex<Option<JoinHandle<()>>>,
    ping_task: JoinHandle<()>,
}

impl Gateway {
    /// Connect with default options.
    pub async fn connect(url: &str, variant: ProtocolVariant) -> Result<Self, GatewayError> {
        Self::connect_with(url, variant, GatewayOptions::default()).await
    }

    /// Open the socket with the variant's subprotocol and start the read loop and ping probe.
    pub async fn connect_with(
        url: &str,
        variant: ProtocolVariant,
        options: GatewayOptions,
    ) -> Result<Self, GatewayError> {
        let mut request = url.into_client_request().map_err(GatewayError::Connect)?;
        request.headers_mut().insert(
            SEC_WEBSOCKET_PROTOCOL,
            HeaderValue::from_static(variant.subprotocol()),
        );
        let (ws, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(GatewayError::Connect)?;
        log::info!("gateway: connected to {} ({})", url, variant.subprotocol());

        let (sink, stream) = ws.split();
        let (errors_tx, errors_rx) = mpsc::channel(ERROR_CHANNEL_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let ping_interval = options.ping_interval;
        let shared = Arc::new(Shared {
            registry: Registry::new(options.queue_capacity, options.overflow, options.used_linger),
            writer: tokio::sync::Mutex::new(sink),
            errors: errors_tx,
            reported: AtomicBool::new(false),
            shutdown: shutdown_tx,
            variant,
            options,
        });

        let read_task = tokio::spawn(read_loop(Arc::clone(&shared), stream, shutdown_rx.clone()));
        let ping_task = tokio::spawn(ping_loop(Arc::clone(&shared), ping_interval, shutdown_rx));

        Ok(Self {
            shared,
            errors: Mutex::new(Some(errors_rx)),
            read_task: Mutex::new(Some(read_task)),
            ping_task,
        })
    }

    /// Receiver for fatal connection errors. Only the first call gets it.
    pub fn take_errors(&self) -> Option<mpsc::Receiver<GatewayError>> {
        lock(&self.errors).take()
    }

    pub fn variant(&self) -> &ProtocolVariant {
        &self.shared.variant
    }

    /// True once the read loop has stopped; every further request fails.
    pub fn is_closed(&self) -> bool {
        self.shared.registry.is_closed()
    }

    /// Number of transactions still registered (including ones consumed by an ack).
    pub fn pending_transactions(&self) -> usize {
        self.shared.registry.pending_count()
    }

    /// Number of sessions created on this connection and not yet destroyed.
    pub fn session_count(&self) -> usize {
        self.shared.registry.session_count()
    }

    /// `info`: server name, version and capabilities.
    pub async fn info(&self) -> Result<ServerInfoMsg, GatewayError> {
        let mut txn = self
            .shared
            .transact("info", Map::new(), TransactionKind::Single)
            .await?;
        match txn.recv().await? {
            Message::ServerInfo(info) => Ok(info),
            Message::Error(e) => Err(e.into_error()),
            other => Err(GatewayError::unexpected("info", other.kind().as_str())),
        }
    }

    /// `create`: open a new session on the server.
    pub async fn create(&self) -> Result<Session, GatewayError> {
        let mut txn = self
            .shared
            .transact("create", Map::new(), TransactionKind::Single)
            .await?;
        let success = match txn.recv().await? {
            Message::Success(s) => s,
            Message::Error(e) => return Err(e.into_error()),
            other => return Err(GatewayError::unexpected("create", other.kind().as_str())),
        };
        let id = success
            .data
            .ok_or_else(|| GatewayError::unexpected("create", "success without data.id"))?
            .id;
        let events = self.shared.registry.add_session(id);
        log::debug!("gateway: session {} created", id);
        Ok(Session::new(Arc::downgrade(&self.shared), id, events))
    }

    /// Admin `get_status`: returns the `status` object of the reply.
    pub async fn get_status(&self) -> Result<Value, GatewayError> {
        let mut txn = self
            .shared
            .transact("get_status", Map::new(), TransactionKind::Single)
            .await?;
        match txn.recv().await? {
            Message::Success(mut s) => s.extra.remove("status").ok_or_else(|| {
                GatewayError::unexpected("get_status", "success without status field")
            }),
            Message::Error(e) => Err(e.into_error()),
            other => Err(GatewayError::unexpected("get_status", other.kind().as_str())),
        }
    }

    /// True while the ping task is still running.
    pub fn is_pinging(&self) -> bool {
        !self.ping_task.is_finished()
    }

    /// Send a close frame and stop the read loop. The read loop reports `ConnectionClosed`
    /// once on the error channel and fails every pending request. Queues are closed first so
    /// a read loop blocked on a full queue can stop.
    pub async fn close(&self) {
        if let Err(e) = self.shared.writer.lock().await.close().await {
            log::debug!("gateway: close frame not sent: {}", e);
        }
        self.shared.shutdown.send_replace(true);
        self.shared.registry.close_all();
        let task = lock(&self.read_task).take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        self.shared.shutdown.send_replace(true);
        self.shared.registry.close_all();
        self.ping_task.abort();
    }
}

/// What the read loop does with one item from the socket.
enum Inbound {
    Text(String),
    Skip,
    End(GatewayError),
}

fn inbound(next: Option<Result<WsMessage, WsError>>) -> Inbound {
    match next {
        Some(Ok(WsMessage::Text(text))) => Inbound::Text(text),
        Some(Ok(WsMessage::Binary(data))) => {
            log::debug!("gateway: ignoring {} byte binary frame", data.len());
            Inbound::Skip
        }
        Some(Ok(WsMessage::Close(frame))) => {
            log::info!("gateway: server closed the connection: {:?}", frame);
            Inbound::End(GatewayError::ConnectionClosed)
        }
        Some(Ok(_)) => Inbound::Skip,
        Some(Err(e)) => Inbound::End(GatewayError::Io(e)),
        None => Inbound::End(GatewayError::ConnectionClosed),
    }
}

async fn read_loop(
    shared: Arc<Shared>,
    mut stream: SplitStream<WsStream>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut backlog: VecDeque<String> = VecDeque::new();
    let err = 'read: loop {
        let text = match backlog.pop_front() {
            Some(text) => text,
            None => {
                let next = tokio::select! {
                    _ = shutdown.changed() => break GatewayError::ConnectionClosed,
                    next = stream.next() => next,
                };
                match inbound(next) {
                    Inbound::Text(text) => text,
                    Inbound::Skip => continue,
                    Inbound::End(err) => break err,
                }
            }
        };
        let dispatch = shared.dispatch(&text);
        tokio::pin!(dispatch);
        loop {
            tokio::select! {
                biased;
                _ = &mut dispatch => break,
                _ = shutdown.changed() => break 'read GatewayError::ConnectionClosed,
                next = stream.next(), if backlog.len() < READ_BACKLOG => match inbound(next) {
                    Inbound::Text(text) => backlog.push_back(text),
                    Inbound::Skip => {}
                    Inbound::End(err) => break 'read err,
                },
            }
        }
    };
    log::info!("gateway: read loop stopped: {}", err);
    shared.registry.close_all();
    shared.shutdown.send_replace(true);
    shared.report(err);
}

async fn ping_loop(shared: Arc<Shared>, every: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown.changed() => return,
            _ = ticker.tick() => {}
        }
        if shared.registry.is_closed() {
            return;
        }
        let result = shared.writer.lock().await.send(WsMessage::Ping(Vec::new())).await;
        if let Err(e) = result {
            log::warn!("gateway: ping failed, stopping probe: {}", e);
            shared.report(GatewayError::Io(e));
            return;
        }
    }
}
