//! Janus client library: WebSocket gateway connection, sessions and plugin handles,
//! admin API access, and the video-room plugin.

pub mod config;
pub mod error;
pub mod gateway;
pub mod videoroom;

pub use error::GatewayError;
