//! Video-room plugin request and response bodies.
//!
//! Requests are the plugin `body` minus the `request`/`ptype` tags, which the
//! [`VideoRoom`](super::VideoRoom) methods add. Responses are decoded from `plugindata.data`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

fn is_false(b: &bool) -> bool {
    !*b
}

/// Room settings for `create`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Room {
    pub room: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub is_private: bool,
    /// Password needed to manipulate (e.g. destroy) the room.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    /// Password needed to join the room.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin: Option<String>,
    /// Max concurrent publishers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publishers: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<u64>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub bitrate_cap: bool,
    /// Send a FIR to publishers every `fir_freq` seconds (0 disables).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fir_freq: Option<u32>,
    /// Comma separated codec preference, e.g. `opus,pcmu`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audiocodec: Option<String>,
    /// Comma separated codec preference, e.g. `vp9,vp8,h264`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub videocodec: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub record: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rec_dir: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub lock_record: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub notify_joining: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub require_pvtid: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub require_e2ee: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub audiolevel_event: bool,
}

/// One entry of the `list` reply.
#[derive(Debug, Clone, Deserialize)]
pub struct RoomInfo {
    pub room: u64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub pin_required: bool,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub max_publishers: u32,
    #[serde(default)]
    pub bitrate: u64,
    #[serde(default)]
    pub audiocodec: Option<String>,
    #[serde(default)]
    pub videocodec: Option<String>,
    #[serde(default)]
    pub record: bool,
    #[serde(default)]
    pub num_participants: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateRoom {
    #[serde(flatten)]
    pub room: Room,
    /// Also save the room to the plugin's config file.
    #[serde(skip_serializing_if = "is_false")]
    pub permanent: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DestroyRoom {
    pub room: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    #[serde(skip_serializing_if = "is_false")]
    pub permanent: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct JoinPublisher {
    pub room: u64,
    /// Requested feed id; the plugin picks one when absent.
    #[serde(rename = "id", skip_serializing_if = "Option::is_none")]
    pub feed_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublishDescription {
    pub mid: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Publish {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audiocodec: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub videocodec: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<u64>,
    #[serde(skip_serializing_if = "is_false")]
    pub record: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub descriptions: Vec<PublishDescription>,
}

/// A feed to subscribe to.
#[derive(Debug, Clone, Serialize)]
pub struct SubscribeStream {
    pub feed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crossrefid: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct JoinSubscriber {
    pub room: u64,
    #[serde(skip_serializing_if = "is_false")]
    pub use_msid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pin: Option<String>,
    pub streams: Vec<SubscribeStream>,
}

/// Header shared by every video-room reply.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ReplyHead {
    #[serde(default)]
    pub videoroom: String,
    #[serde(default)]
    pub error_code: Option<i64>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoomCreated {
    pub room: u64,
    #[serde(default)]
    pub permanent: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RoomExists {
    #[serde(default)]
    pub exists: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RoomList {
    #[serde(default)]
    pub list: Vec<RoomInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublisherStream {
    #[serde(rename = "type", default)]
    pub media_type: String,
    #[serde(default)]
    pub mindex: u32,
    #[serde(default)]
    pub mid: String,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub codec: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub moderated: bool,
    #[serde(default)]
    pub simulcast: bool,
    #[serde(default)]
    pub svc: bool,
    #[serde(default)]
    pub talking: bool,
}

/// An active publisher in the room.
#[derive(Debug, Clone, Deserialize)]
pub struct Publisher {
    pub id: u64,
    #[serde(default)]
    pub display: Option<String>,
    #[serde(default)]
    pub dummy: bool,
    #[serde(default)]
    pub talking: bool,
    #[serde(default)]
    pub streams: Vec<PublisherStream>,
}

/// A participant that joined without publishing.
#[derive(Debug, Clone, Deserialize)]
pub struct Attendee {
    pub id: u64,
    #[serde(default)]
    pub display: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublisherJoined {
    pub room: u64,
    #[serde(default)]
    pub description: Option<String>,
    pub id: u64,
    #[serde(default)]
    pub private_id: u64,
    #[serde(default)]
    pub publishers: Vec<Publisher>,
    #[serde(default)]
    pub attendees: Vec<Attendee>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriberStream {
    #[serde(default)]
    pub mindex: u32,
    #[serde(default)]
    pub mid: String,
    #[serde(rename = "type", default)]
    pub media_type: String,
    #[serde(default)]
    pub feed_id: u64,
    #[serde(default)]
    pub feed_mid: Option<String>,
    #[serde(default)]
    pub feed_display: Option<String>,
    #[serde(default)]
    pub send: bool,
    #[serde(default)]
    pub ready: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriberJoined {
    pub room: u64,
    #[serde(default)]
    pub streams: Vec<SubscriberStream>,
    /// Offer from the plugin, to be answered through `start_subscription`.
    #[serde(skip)]
    pub jsep: Option<Value>,
}

/// Asynchronous notifications the plugin sends on a publisher handle.
#[derive(Debug, Clone)]
pub enum RoomEvent {
    /// New feeds became available.
    Publishers(Vec<Publisher>),
    /// A feed stopped publishing.
    Unpublished(u64),
    /// A participant left.
    Leaving(u64),
    /// The room was destroyed.
    Destroyed(u64),
    Other(Value),
}
