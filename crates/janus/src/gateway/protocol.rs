//! Janus wire protocol types: outbound requests and the closed set of inbound messages.
//!
//! Every frame is a JSON object whose `janus` field names the message kind. Inbound frames
//! are decoded twice: first into an [`Envelope`] (kind and routing ids), then into the typed
//! payload for that kind.

use crate::error::GatewayError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Subprotocol requested by regular clients.
pub const SUBPROTOCOL: &str = "janus-protocol";
/// Subprotocol requested by admin clients.
pub const ADMIN_SUBPROTOCOL: &str = "janus-admin-protocol";

/// Wire request: `{ "janus": method, "transaction": id, ...fields }`.
#[derive(Debug, Clone, Serialize)]
pub struct OutgoingRequest {
    pub janus: String,
    pub transaction: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_secret: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Minimal view of an inbound frame used for the routing decision.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    pub janus: String,
    #[serde(default)]
    pub transaction: Option<String>,
    #[serde(default)]
    pub session_id: Option<u64>,
    /// Handle id; Janus calls it `sender` on inbound frames.
    #[serde(default)]
    pub sender: Option<u64>,
}

/// Closed set of message kinds understood by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    Ack,
    Success,
    Error,
    Event,
    Media,
    WebRtcUp,
    SlowLink,
    Hangup,
    ServerInfo,
    Timeout,
    Detached,
    Unknown(String),
}

impl MessageKind {
    pub fn from_discriminator(s: &str) -> Self {
        match s {
            "ack" => Self::Ack,
            "success" => Self::Success,
            "error" => Self::Error,
            "event" => Self::Event,
            "media" => Self::Media,
            "webrtcup" => Self::WebRtcUp,
            "slowlink" => Self::SlowLink,
            "hangup" => Self::Hangup,
            "server_info" => Self::ServerInfo,
            "timeout" => Self::Timeout,
            "detached" => Self::Detached,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Ack => "ack",
            Self::Success => "success",
            Self::Error => "error",
            Self::Event => "event",
            Self::Media => "media",
            Self::WebRtcUp => "webrtcup",
            Self::SlowLink => "slowlink",
            Self::Hangup => "hangup",
            Self::ServerInfo => "server_info",
            Self::Timeout => "timeout",
            Self::Detached => "detached",
            Self::Unknown(s) => s,
        }
    }
}

/// `{ "plugin": name, "data": {...} }` attached to plugin replies and events.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginData {
    #[serde(default)]
    pub plugin: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AckMsg {
    #[serde(default)]
    pub transaction: Option<String>,
    #[serde(default)]
    pub session_id: Option<u64>,
    #[serde(default)]
    pub hint: Option<String>,
}

/// `data.id` of a successful create or attach.
#[derive(Debug, Clone, Deserialize)]
pub struct SuccessData {
    pub id: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SuccessMsg {
    #[serde(default)]
    pub transaction: Option<String>,
    #[serde(default)]
    pub session_id: Option<u64>,
    #[serde(default)]
    pub sender: Option<u64>,
    #[serde(default)]
    pub data: Option<SuccessData>,
    #[serde(default)]
    pub plugindata: Option<PluginData>,
    /// Any other top-level fields (e.g. `status` on admin replies).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorData {
    pub code: i64,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorMsg {
    #[serde(default)]
    pub transaction: Option<String>,
    #[serde(default)]
    pub session_id: Option<u64>,
    pub error: ErrorData,
}

impl ErrorMsg {
    pub fn into_error(self) -> GatewayError {
        GatewayError::Protocol {
            code: self.error.code,
            reason: self.error.reason,
        }
    }
}

/// Plugin event. May carry a JSEP (session description), kept opaque.
#[derive(Debug, Clone, Deserialize)]
pub struct EventMsg {
    #[serde(default)]
    pub transaction: Option<String>,
    #[serde(default)]
    pub session_id: Option<u64>,
    #[serde(default)]
    pub sender: Option<u64>,
    #[serde(default)]
    pub plugindata: PluginData,
    #[serde(default)]
    pub jsep: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaMsg {
    #[serde(default)]
    pub session_id: Option<u64>,
    #[serde(default)]
    pub sender: Option<u64>,
    #[serde(rename = "type", default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub mid: Option<String>,
    #[serde(default)]
    pub receiving: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebRtcUpMsg {
    #[serde(default)]
    pub session_id: Option<u64>,
    #[serde(default)]
    pub sender: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlowLinkMsg {
    #[serde(default)]
    pub session_id: Option<u64>,
    #[serde(default)]
    pub sender: Option<u64>,
    #[serde(default)]
    pub uplink: bool,
    #[serde(default)]
    pub media: Option<String>,
    #[serde(default)]
    pub lost: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HangupMsg {
    #[serde(default)]
    pub session_id: Option<u64>,
    #[serde(default)]
    pub sender: Option<u64>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerInfoMsg {
    #[serde(default)]
    pub transaction: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub version_string: String,
    #[serde(default)]
    pub author: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Session expired on the server.
#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutMsg {
    #[serde(default)]
    pub session_id: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetachedMsg {
    #[serde(default)]
    pub session_id: Option<u64>,
    #[serde(default)]
    pub sender: Option<u64>,
}

/// A fully decoded inbound message.
#[derive(Debug, Clone)]
pub enum Message {
    Ack(AckMsg),
    Success(SuccessMsg),
    Error(ErrorMsg),
    Event(EventMsg),
    Media(MediaMsg),
    WebRtcUp(WebRtcUpMsg),
    SlowLink(SlowLinkMsg),
    Hangup(HangupMsg),
    ServerInfo(ServerInfoMsg),
    Timeout(TimeoutMsg),
    Detached(DetachedMsg),
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Ack(_) => MessageKind::Ack,
            Self::Success(_) => MessageKind::Success,
            Self::Error(_) => MessageKind::Error,
            Self::Event(_) => MessageKind::Event,
            Self::Media(_) => MessageKind::Media,
            Self::WebRtcUp(_) => MessageKind::WebRtcUp,
            Self::SlowLink(_) => MessageKind::SlowLink,
            Self::Hangup(_) => MessageKind::Hangup,
            Self::ServerInfo(_) => MessageKind::ServerInfo,
            Self::Timeout(_) => MessageKind::Timeout,
            Self::Detached(_) => MessageKind::Detached,
        }
    }

    pub fn is_ack(&self) -> bool {
        matches!(self, Self::Ack(_))
    }
}

/// Why an inbound frame was dropped.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unknown message kind '{0}'")]
    UnknownKind(String),
}

/// Decode one text frame into its routing envelope and typed message.
pub fn decode(frame: &str) -> Result<(Envelope, Message), DecodeError> {
    let value: Value = serde_json::from_str(frame)?;
    let envelope = Envelope::deserialize(&value)?;
    let message = match MessageKind::from_discriminator(&envelope.janus) {
        MessageKind::Ack => Message::Ack(serde_json::from_value(value)?),
        MessageKind::Success => Message::Success(serde_json::from_value(value)?),
        MessageKind::Error => Message::Error(serde_json::from_value(value)?),
        MessageKind::Event => Message::Event(serde_json::from_value(value)?),
        MessageKind::Media => Message::Media(serde_json::from_value(value)?),
        MessageKind::WebRtcUp => Message::WebRtcUp(serde_json::from_value(value)?),
        MessageKind::SlowLink => Message::SlowLink(serde_json::from_value(value)?),
        MessageKind::Hangup => Message::Hangup(serde_json::from_value(value)?),
        MessageKind::ServerInfo => Message::ServerInfo(serde_json::from_value(value)?),
        MessageKind::Timeout => Message::Timeout(serde_json::from_value(value)?),
        MessageKind::Detached => Message::Detached(serde_json::from_value(value)?),
        MessageKind::Unknown(kind) => return Err(DecodeError::UnknownKind(kind)),
    };
    Ok((envelope, message))
}
