//! Error type shared by the gateway connection, sessions, handles and plugin façades.

use tokio_tungstenite::tungstenite;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Dial or WebSocket handshake failed.
    #[error("gateway connect failed: {0}")]
    Connect(#[source] tungstenite::Error),

    /// Socket read or write failed; the connection is unusable afterwards.
    #[error("gateway socket error: {0}")]
    Io(#[source] tungstenite::Error),

    #[error("gateway connection closed")]
    ConnectionClosed,

    /// The server answered the request with an `error` envelope.
    #[error("gateway error {code}: {reason}")]
    Protocol { code: i64, reason: String },

    /// The plugin answered with an error inside its `plugindata`.
    #[error("plugin error {code}: {reason}")]
    Plugin { code: i64, reason: String },

    /// Writing a request failed; the socket error itself goes to the error channel.
    #[error("sending request failed: {0}")]
    SendFailed(String),

    #[error("timed out waiting for reply to '{0}'")]
    Timeout(String),

    #[error("unexpected response received to '{request}' request: {kind}")]
    Unexpected { request: String, kind: String },

    #[error("encoding request failed: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("decoding response failed: {0}")]
    Decode(#[source] serde_json::Error),
}

impl GatewayError {
    pub(crate) fn unexpected(request: impl Into<String>, kind: impl Into<String>) -> Self {
        Self::Unexpected {
            request: request.into(),
            kind: kind.into(),
        }
    }

    /// True for errors after which the connection cannot be used again.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Connect(_) | Self::Io(_) | Self::ConnectionClosed)
    }
}
