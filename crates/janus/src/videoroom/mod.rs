//! Video-room plugin (`janus.plugin.videoroom`) on top of a [`Handle`].
//!
//! Room management goes through [`Handle::request`] (answered synchronously); joining,
//! publishing and subscribing go through [`Handle::message`] (acked, then answered by an
//! event that may carry a session description).

mod types;

pub use types::{
    Attendee, CreateRoom, DestroyRoom, JoinPublisher, JoinSubscriber, Publish,
    PublishDescription, Publisher, PublisherJoined, PublisherStream, Room, RoomCreated,
    RoomEvent, RoomInfo, SubscribeStream, SubscriberJoined, SubscriberStream,
};

use crate::error::GatewayError;
use crate::gateway::{EventMsg, Handle, Message, Session};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use types::{ReplyHead, RoomExists, RoomList};

pub const VIDEOROOM_PLUGIN: &str = "janus.plugin.videoroom";

/// Plugin body: `{ "request": ..., ["ptype": ...], ...params }`.
#[derive(Serialize)]
struct Tagged<'a, T: Serialize + ?Sized> {
    request: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    ptype: Option<&'static str>,
    #[serde(flatten)]
    params: &'a T,
}

#[derive(Serialize)]
struct NoParams {}

#[derive(Serialize)]
struct RoomParam {
    room: u64,
}

fn tagged<'a, T: Serialize + ?Sized>(request: &'static str, params: &'a T) -> Tagged<'a, T> {
    Tagged {
        request,
        ptype: None,
        params,
    }
}

/// Check the `videoroom` field and plugin error of a reply, then decode it.
fn decode_reply<T: DeserializeOwned>(op: &str, data: Value, expect: &str) -> Result<T, GatewayError> {
    let head = ReplyHead::deserialize_from(&data)?;
    if let Some(code) = head.error_code {
        return Err(GatewayError::Plugin {
            code,
            reason: head.error.unwrap_or_default(),
        });
    }
    if head.videoroom != expect {
        return Err(GatewayError::unexpected(op, head.videoroom));
    }
    serde_json::from_value(data).map_err(GatewayError::Decode)
}

/// Check an `event` reply whose `field` must be `"ok"` (e.g. `configured`, `started`).
fn expect_ok(op: &str, data: &Value, fields: &[&str]) -> Result<(), GatewayError> {
    let head = ReplyHead::deserialize_from(data)?;
    if let Some(code) = head.error_code {
        return Err(GatewayError::Plugin {
            code,
            reason: head.error.unwrap_or_default(),
        });
    }
    let ok = head.videoroom == "event"
        && fields
            .iter()
            .any(|f| data.get(*f).and_then(Value::as_str) == Some("ok"));
    if ok {
        Ok(())
    } else {
        Err(GatewayError::unexpected(op, head.videoroom))
    }
}

impl ReplyHead {
    fn deserialize_from(data: &Value) -> Result<Self, GatewayError> {
        ReplyHead::deserialize(data).map_err(GatewayError::Decode)
    }
}

/// A handle attached to the video-room plugin.
#[derive(Debug, Clone)]
pub struct VideoRoom {
    handle: Handle,
}

impl VideoRoom {
    pub async fn attach(session: &Session) -> Result<Self, GatewayError> {
        let handle = session.attach(VIDEOROOM_PLUGIN).await?;
        Ok(Self { handle })
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub async fn create_room(&self, req: &CreateRoom) -> Result<RoomCreated, GatewayError> {
        let reply = self.handle.request(&tagged("create", req)).await?;
        decode_reply("create", reply.data, "created")
    }

    pub async fn exists_room(&self, room: u64) -> Result<bool, GatewayError> {
        let reply = self
            .handle
            .request(&tagged("exists", &RoomParam { room }))
            .await?;
        let exists: RoomExists = decode_reply("exists", reply.data, "success")?;
        Ok(exists.exists)
    }

    pub async fn destroy_room(&self, req: &DestroyRoom) -> Result<(), GatewayError> {
        let reply = self.handle.request(&tagged("destroy", req)).await?;
        decode_reply::<Value>("destroy", reply.data, "destroyed").map(|_| ())
    }

    pub async fn list_rooms(&self) -> Result<Vec<RoomInfo>, GatewayError> {
        let reply = self.handle.request(&tagged("list", &NoParams {})).await?;
        let list: RoomList = decode_reply("list", reply.data, "success")?;
        Ok(list.list)
    }

    pub async fn join_publisher(&self, req: &JoinPublisher) -> Result<PublisherJoined, GatewayError> {
        let body = Tagged {
            request: "join",
            ptype: Some("publisher"),
            params: req,
        };
        let ev = self.handle.message(&body, None).await?;
        decode_reply("join", ev.plugindata.data, "joined")
    }

    /// Join as a subscriber; the returned offer must be answered with
    /// [`start_subscription`](Self::start_subscription).
    pub async fn join_subscriber(
        &self,
        req: &JoinSubscriber,
    ) -> Result<SubscriberJoined, GatewayError> {
        let body = Tagged {
            request: "join",
            ptype: Some("subscriber"),
            params: req,
        };
        let EventMsg {
            plugindata, jsep, ..
        } = self.handle.message(&body, None).await?;
        let mut joined: SubscriberJoined = decode_reply("join", plugindata.data, "attached")?;
        joined.jsep = jsep;
        Ok(joined)
    }

    /// Publish with an offer; returns the plugin's answer.
    pub async fn publish(&self, req: &Publish, offer: Value) -> Result<Option<Value>, GatewayError> {
        let ev = self
            .handle
            .message(&tagged("publish", req), Some(offer))
            .await?;
        expect_ok("publish", &ev.plugindata.data, &["configured"])?;
        Ok(ev.jsep)
    }

    pub async fn unpublish(&self) -> Result<(), GatewayError> {
        let ev = self
            .handle
            .message(&tagged("unpublish", &NoParams {}), None)
            .await?;
        expect_ok("unpublish", &ev.plugindata.data, &["unpublished"])
    }

    /// Answer the subscriber offer and start receiving media.
    pub async fn start_subscription(&self, answer: Value) -> Result<(), GatewayError> {
        let ev = self
            .handle
            .message(&tagged("start", &NoParams {}), Some(answer))
            .await?;
        expect_ok("start", &ev.plugindata.data, &["started"])
    }

    /// Leave the room (publisher `leaving` or subscriber `left`).
    pub async fn leave(&self) -> Result<(), GatewayError> {
        let ev = self
            .handle
            .message(&tagged("leave", &NoParams {}), None)
            .await?;
        expect_ok("leave", &ev.plugindata.data, &["leaving", "left"])
    }

    pub async fn detach(&self) -> Result<(), GatewayError> {
        self.handle.detach().await
    }

    /// Wait for the next plugin event on this handle and classify it. Non-plugin events
    /// (media state, hangup, ...) are skipped; `None` once the handle is gone.
    pub async fn next_room_event(&self) -> Option<RoomEvent> {
        loop {
            match self.handle.next_event().await? {
                Message::Event(ev) => return Some(room_event(ev.plugindata.data)),
                other => {
                    log::debug!(
                        "videoroom: handle {} skipping '{}' event",
                        self.handle.id(),
                        other.kind().as_str()
                    );
                }
            }
        }
    }
}

/// Classify an asynchronous video-room event body.
pub fn room_event(data: Value) -> RoomEvent {
    if let Some(publishers) = data.get("publishers") {
        if let Ok(list) = serde_json::from_value::<Vec<Publisher>>(publishers.clone()) {
            return RoomEvent::Publishers(list);
        }
    }
    if let Some(id) = data.get("unpublished").and_then(Value::as_u64) {
        return RoomEvent::Unpublished(id);
    }
    if let Some(id) = data.get("leaving").and_then(Value::as_u64) {
        return RoomEvent::Leaving(id);
    }
    if data.get("videoroom").and_then(Value::as_str) == Some("destroyed") {
        if let Some(room) = data.get("room").and_then(Value::as_u64) {
            return RoomEvent::Destroyed(room);
        }
    }
    RoomEvent::Other(data)
}
