//! Error types for framelink.

use thiserror::Error;

/// Frame-level validation failures reported by the stream parser.
///
/// All of these are recovered locally by resynchronizing the stream; they are
/// surfaced to callers only as diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameError {
    /// No start-of-frame byte anywhere in the buffered data.
    #[error("SOF not found")]
    MissingSof,

    /// Declared payload length exceeds the maximum.
    #[error("Payload {0} exceeds limit")]
    LengthTooLarge(u16),

    /// Reserved. No parser path produces this kind.
    #[error("Length mismatch")]
    LengthMismatch,

    /// Trailer CRC does not match the computed value.
    #[error("CRC mismatch calc=0x{calculated:04x} recv=0x{received:04x}")]
    InvalidCrc { calculated: u16, received: u16 },

    /// Terminal byte is not EOF.
    #[error("Invalid EOF 0x{0:02x}")]
    InvalidEof(u8),

    /// Version byte is not the supported version.
    #[error("Unsupported version {0}")]
    UnsupportedVersion(u8),
}

/// Main error type for all framelink operations.
#[derive(Debug, Error)]
pub enum LinkError {
    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error (configuration and event export).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed frame on the wire.
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    /// Payload does not fit in a single frame.
    #[error("Payload size {len} exceeds maximum {max}")]
    PayloadTooLarge { len: usize, max: usize },

    /// Ack payload shorter than its fixed fields.
    #[error("Malformed ack: {len} bytes, need at least {min}")]
    MalformedAck { len: usize, min: usize },

    /// Request envelope shorter than its fixed fields.
    #[error("Malformed request: {len} bytes, need at least {min}")]
    MalformedRequest { len: usize, min: usize },

    /// Send attempted while the client is not connected.
    #[error("Not connected")]
    NotConnected,

    /// Connection (or the session task behind a handle) is gone.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Backpressure timeout - write buffer full.
    #[error("Backpressure timeout")]
    BackpressureTimeout,

    /// Invalid or unreadable configuration.
    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// Result type alias using LinkError.
pub type Result<T> = std::result::Result<T, LinkError>;
