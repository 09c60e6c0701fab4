//! Multi-client listener.
//!
//! [`Listener`] accepts TCP connections and runs one session task per
//! connection. Sessions parse inbound frames, keep a [`ConnectionRecord`]
//! current, and answer every frame with an ack whose optional forced
//! interval is read from the listener's [`SharedRuntimeConfig`] at build
//! time.
//!
//! All observations arrive on a single [`ServerEvent`] channel. For any one
//! connection, a record update is always sent before the notification it
//! explains.

mod listener;
mod record;
mod runtime;
mod session;

use bytes::Bytes;

use crate::codec::RequestEnvelope;
use crate::error::FrameError;

pub use listener::{Listener, ListenerBuilder};
pub use record::{ConnectionRecord, ConnectionStatus, ConnectionTable};
pub use runtime::SharedRuntimeConfig;

/// Everything a listener reports.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// Accept loop running on `port`.
    Listening { port: u16 },
    /// `stop()` completed.
    Stopped,
    /// A connection record was created or changed.
    ConnectionUpdated(ConnectionRecord),
    /// A connection ended. Sent once per connection.
    ConnectionClosed { id: String },
    /// A valid frame arrived.
    FrameReceived {
        id: String,
        payload: Bytes,
        /// Decoded envelope, when the payload is long enough to hold one.
        request: Option<RequestEnvelope>,
    },
    /// The stream parser discarded bytes.
    InvalidPacket { id: String, error: FrameError },
}

impl ServerEvent {
    /// Connection id this event concerns, if any.
    pub fn connection_id(&self) -> Option<&str> {
        match self {
            ServerEvent::ConnectionUpdated(record) => Some(&record.id),
            ServerEvent::ConnectionClosed { id }
            | ServerEvent::FrameReceived { id, .. }
            | ServerEvent::InvalidPacket { id, .. } => Some(id),
            ServerEvent::Listening { .. } | ServerEvent::Stopped => None,
        }
    }
}
