//! Gateway: client side of the Janus WebSocket control plane.
//!
//! One [`Gateway`] per socket. Requests are correlated by transaction id; unsolicited
//! messages are routed to the [`Session`] or [`Handle`] they address.

mod connection;
mod protocol;
mod queue;
mod registry;
mod session;

pub use connection::{Gateway, GatewayOptions, ProtocolVariant};
pub use protocol::{
    decode, AckMsg, DecodeError, DetachedMsg, Envelope, ErrorData, ErrorMsg, EventMsg, HangupMsg,
    MediaMsg, Message, MessageKind, PluginData, ServerInfoMsg, SlowLinkMsg, SuccessData,
    SuccessMsg, TimeoutMsg, WebRtcUpMsg, ADMIN_SUBPROTOCOL, SUBPROTOCOL,
};
pub use queue::{EventQueue, OverflowPolicy};
pub use session::{Handle, Session, DEFAULT_KEEPALIVE_INTERVAL};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a std mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
