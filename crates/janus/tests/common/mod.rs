//! In-process mock Janus server for integration tests.
//!
//! Accepts one WebSocket connection on a free port, echoes the requested subprotocol, records
//! every request, and answers through a caller-supplied handler. [`Janus`] is a small
//! stateful stand-in for the real server (sessions, handles, an echo plugin and the
//! video-room plugin) that handlers can fall back to.

#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::Message;

pub const ECHO_PLUGIN: &str = "janus.plugin.echotest";
pub const ADMIN_SECRET: &str = "janusoverlord";

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

enum Control {
    Send(Value),
    Raw(String),
    Close,
}

pub struct MockJanus {
    pub url: String,
    requests: mpsc::UnboundedReceiver<Value>,
    control: mpsc::UnboundedSender<Control>,
    subprotocol: Arc<Mutex<Option<String>>>,
}

impl MockJanus {
    /// Start a server answering each request with the frames `handler` returns, in order.
    pub async fn start<F>(mut handler: F) -> Self
    where
        F: FnMut(&Value) -> Vec<Value> + Send + 'static,
    {
        let port = free_port();
        let listener = TcpListener::bind(("127.0.0.1", port))
            .await
            .expect("bind mock janus");
        let (requests_tx, requests) = mpsc::unbounded_channel();
        let (control, mut control_rx) = mpsc::unbounded_channel();
        let subprotocol = Arc::new(Mutex::new(None));
        let seen_protocol = Arc::clone(&subprotocol);

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let callback = |req: &Request, mut resp: Response| -> Result<Response, ErrorResponse> {
                if let Some(p) = req.headers().get(SEC_WEBSOCKET_PROTOCOL) {
                    *seen_protocol.lock().unwrap() = p.to_str().ok().map(str::to_string);
                    resp.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, p.clone());
                }
                Ok(resp)
            };
            let ws = tokio_tungstenite::accept_hdr_async(stream, callback)
                .await
                .expect("websocket handshake");
            let (mut sink, mut stream) = ws.split();
            loop {
                tokio::select! {
                    frame = stream.next() => match frame {
                        Some(Ok(Message::Text(text))) => {
                            let req: Value = serde_json::from_str(&text).expect("request json");
                            let _ = requests_tx.send(req.clone());
                            for reply in handler(&req) {
                                if sink.send(Message::Text(reply.to_string())).await.is_err() {
                                    return;
                                }
                            }
                        }
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                        Some(Ok(_)) => {}
                    },
                    ctl = control_rx.recv() => match ctl {
                        Some(Control::Send(v)) => {
                            if sink.send(Message::Text(v.to_string())).await.is_err() {
                                return;
                            }
                        }
                        Some(Control::Raw(s)) => {
                            if sink.send(Message::Text(s)).await.is_err() {
                                return;
                            }
                        }
                        // Drop both halves without a close handshake.
                        Some(Control::Close) | None => return,
                    },
                }
            }
        });

        Self {
            url: format!("ws://127.0.0.1:{}", port),
            requests,
            control,
            subprotocol,
        }
    }

    /// Start a server backed by a fresh [`Janus`].
    pub async fn janus() -> Self {
        let mut janus = Janus::default();
        Self::start(move |req| janus.reply(req)).await
    }

    /// Push an unsolicited frame to the client.
    pub fn push(&self, frame: Value) {
        let _ = self.control.send(Control::Send(frame));
    }

    pub fn push_raw(&self, frame: &str) {
        let _ = self.control.send(Control::Raw(frame.to_string()));
    }

    /// Drop the transport without a close handshake.
    pub fn kill(&self) {
        let _ = self.control.send(Control::Close);
    }

    pub fn subprotocol(&self) -> Option<String> {
        self.subprotocol.lock().unwrap().clone()
    }

    /// Next recorded request with the given `janus` method.
    pub async fn next_request(&mut self, method: &str) -> Value {
        loop {
            let req = tokio::time::timeout(Duration::from_secs(5), self.requests.recv())
                .await
                .expect("request within 5s")
                .expect("mock still running");
            if req["janus"] == method {
                return req;
            }
        }
    }
}

fn success(req: &Value) -> Value {
    json!({"janus": "success", "transaction": req["transaction"]})
}

fn error(req: &Value, code: i64, reason: &str) -> Value {
    json!({
        "janus": "error",
        "transaction": req["transaction"],
        "session_id": req.get("session_id"),
        "error": {"code": code, "reason": reason},
    })
}

fn plugin_reply(req: &Value, kind: &str, plugin: &str, data: Value) -> Value {
    json!({
        "janus": kind,
        "transaction": req["transaction"],
        "session_id": req["session_id"],
        "sender": req["handle_id"],
        "plugindata": {"plugin": plugin, "data": data},
    })
}

#[derive(Debug, Clone)]
struct MockRoom {
    description: String,
    publishers: BTreeMap<u64, String>,
}

/// Minimal stateful Janus: sessions, handles, echo and video-room plugins, admin status.
pub struct Janus {
    next_id: u64,
    pub sessions: HashMap<u64, Vec<u64>>,
    pub handles: HashMap<u64, String>,
    rooms: BTreeMap<u64, MockRoom>,
    last_handle: Option<u64>,
}

impl Default for Janus {
    fn default() -> Self {
        let mut rooms = BTreeMap::new();
        rooms.insert(
            1234,
            MockRoom {
                description: "Demo Room".into(),
                publishers: BTreeMap::new(),
            },
        );
        Self {
            next_id: 1000,
            sessions: HashMap::new(),
            handles: HashMap::new(),
            rooms,
            last_handle: None,
        }
    }
}

impl Janus {
    fn next(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn last_handle(&self) -> Option<u64> {
        self.last_handle
    }

    pub fn reply(&mut self, req: &Value) -> Vec<Value> {
        let method = req["janus"].as_str().unwrap_or_default();
        let session = req["session_id"].as_u64();
        if !matches!(method, "create" | "info" | "get_status") {
            match session {
                Some(id) if self.sessions.contains_key(&id) => {}
                Some(id) => return vec![error(req, 458, &format!("No such session {}", id))],
                None => return vec![error(req, 456, "Missing session")],
            }
        }
        match method {
            "info" => vec![json!({
                "janus": "server_info",
                "transaction": req["transaction"],
                "name": "Janus WebRTC Server",
                "version": 1200,
                "version_string": "1.2.0",
                "author": "Meetecho s.r.l.",
                "plugins": {ECHO_PLUGIN: {"name": "JANUS EchoTest plugin"}},
            })],
            "create" => {
                let id = self.next();
                self.sessions.insert(id, Vec::new());
                let mut reply = success(req);
                reply["data"] = json!({"id": id});
                vec![reply]
            }
            "keepalive" => vec![json!({
                "janus": "ack",
                "transaction": req["transaction"],
                "session_id": session,
            })],
            "destroy" => {
                if let Some(handles) = session.and_then(|s| self.sessions.remove(&s)) {
                    for h in handles {
                        self.handles.remove(&h);
                    }
                }
                let mut reply = success(req);
                reply["session_id"] = json!(session);
                vec![reply]
            }
            "attach" => {
                let plugin = req["plugin"].as_str().unwrap_or_default().to_string();
                if plugin != ECHO_PLUGIN && plugin != "janus.plugin.videoroom" {
                    return vec![error(req, 460, &format!("No such plugin '{}'", plugin))];
                }
                let id = self.next();
                self.handles.insert(id, plugin);
                if let Some(handles) = session.and_then(|s| self.sessions.get_mut(&s)) {
                    handles.push(id);
                }
                self.last_handle = Some(id);
                let mut reply = success(req);
                reply["session_id"] = json!(session);
                reply["data"] = json!({"id": id});
                vec![reply]
            }
            "detach" => {
                let handle = req["handle_id"].as_u64().unwrap_or_default();
                if self.handles.remove(&handle).is_none() {
                    return vec![error(req, 459, &format!("No such handle {}", handle))];
                }
                let mut reply = success(req);
                reply["session_id"] = json!(session);
                vec![reply]
            }
            "message" => self.message(req),
            "get_status" => {
                if req["admin_secret"] != ADMIN_SECRET {
                    return vec![error(
                        req,
                        403,
                        "Unauthorized request (wrong or missing secret/token)",
                    )];
                }
                let mut reply = success(req);
                reply["status"] = json!({
                    "token_auth": false,
                    "session_timeout": 60,
                    "log_level": 4,
                });
                vec![reply]
            }
            other => vec![error(req, 453, &format!("Unknown request '{}'", other))],
        }
    }

    fn message(&mut self, req: &Value) -> Vec<Value> {
        let handle = req["handle_id"].as_u64().unwrap_or_default();
        let Some(plugin) = self.handles.get(&handle).cloned() else {
            return vec![error(req, 459, &format!("No such handle {}", handle))];
        };
        let body = &req["body"];
        if plugin == ECHO_PLUGIN {
            return match body["request"].as_str() {
                // Answered synchronously.
                Some("echo") => vec![plugin_reply(
                    req,
                    "success",
                    &plugin,
                    json!({"echotest": "response", "body": body, "handle": handle}),
                )],
                // Acked, then answered on the same transaction.
                Some("async") => {
                    let mut event = plugin_reply(
                        req,
                        "event",
                        &plugin,
                        json!({"echotest": "event", "result": "ok", "body": body}),
                    );
                    if let Some(jsep) = req.get("jsep") {
                        event["jsep"] = json!({"type": "answer", "sdp": jsep["sdp"]});
                    }
                    vec![
                        json!({"janus": "ack", "transaction": req["transaction"], "session_id": req["session_id"]}),
                        event,
                    ]
                }
                Some("ignore") => Vec::new(),
                _ => vec![error(req, 454, "Missing request")],
            };
        }
        self.videoroom(req, handle, &plugin)
    }

    fn videoroom(&mut self, req: &Value, handle: u64, plugin: &str) -> Vec<Value> {
        let body = &req["body"];
        let room = body["room"].as_u64().unwrap_or_default();
        let sync = |data: Value| vec![plugin_reply(req, "success", plugin, data)];
        let ack = json!({"janus": "ack", "transaction": req["transaction"], "session_id": req["session_id"]});
        let event = |data: Value| plugin_reply(req, "event", plugin, data);
        let no_room = || json!({"videoroom": "event", "error_code": 426, "error": format!("No such room ({})", room)});

        match body["request"].as_str().unwrap_or_default() {
            "create" => {
                if self.rooms.contains_key(&room) {
                    return sync(json!({"videoroom": "event", "error_code": 427, "error": format!("Room {} already exists", room)}));
                }
                self.rooms.insert(
                    room,
                    MockRoom {
                        description: body["description"].as_str().unwrap_or_default().into(),
                        publishers: BTreeMap::new(),
                    },
                );
                sync(json!({"videoroom": "created", "room": room, "permanent": false}))
            }
            "exists" => sync(json!({"videoroom": "success", "room": room, "exists": self.rooms.contains_key(&room)})),
            "destroy" => match self.rooms.remove(&room) {
                Some(_) => sync(json!({"videoroom": "destroyed", "room": room})),
                None => sync(no_room()),
            },
            "list" => {
                let list: Vec<Value> = self
                    .rooms
                    .iter()
                    .map(|(id, r)| {
                        json!({
                            "room": id,
                            "description": r.description,
                            "pin_required": false,
                            "max_publishers": 3,
                            "bitrate": 0,
                            "num_participants": r.publishers.len(),
                        })
                    })
                    .collect();
                sync(json!({"videoroom": "success", "list": list}))
            }
            "join" if body["ptype"] == "publisher" => {
                let Some(r) = self.rooms.get_mut(&room) else {
                    return vec![ack, event(no_room())];
                };
                let publishers: Vec<Value> = r
                    .publishers
                    .iter()
                    .map(|(id, display)| {
                        json!({"id": id, "display": display, "streams": [{"type": "video", "mindex": 0, "mid": "0", "codec": "vp8"}]})
                    })
                    .collect();
                let display = body["display"].as_str().unwrap_or_default().to_string();
                r.publishers.insert(handle, display);
                vec![
                    ack,
                    event(json!({
                        "videoroom": "joined",
                        "room": room,
                        "description": r.description,
                        "id": handle,
                        "private_id": handle * 10,
                        "publishers": publishers,
                    })),
                ]
            }
            "join" => {
                if !self.rooms.contains_key(&room) {
                    return vec![ack, event(no_room())];
                }
                let streams: Vec<Value> = body["streams"]
                    .as_array()
                    .cloned()
                    .unwrap_or_default()
                    .iter()
                    .enumerate()
                    .map(|(i, s)| json!({"mindex": i, "mid": i.to_string(), "type": "video", "feed_id": s["feed"], "send": true, "ready": false}))
                    .collect();
                let mut reply = event(json!({"videoroom": "attached", "room": room, "streams": streams}));
                reply["jsep"] = json!({"type": "offer", "sdp": "v=0 offer"});
                vec![ack, reply]
            }
            "publish" | "configure" => {
                let mut reply = event(json!({"videoroom": "event", "room": room, "configured": "ok"}));
                reply["jsep"] = json!({"type": "answer", "sdp": "v=0 answer"});
                vec![ack, reply]
            }
            "unpublish" => vec![ack, event(json!({"videoroom": "event", "unpublished": "ok"}))],
            "start" => vec![ack, event(json!({"videoroom": "event", "started": "ok"}))],
            "leave" => {
                for r in self.rooms.values_mut() {
                    r.publishers.remove(&handle);
                }
                vec![ack, event(json!({"videoroom": "event", "leaving": "ok"}))]
            }
            other => sync(json!({"videoroom": "event", "error_code": 423, "error": format!("Unknown request '{}'", other)})),
        }
    }
}
