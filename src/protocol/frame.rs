//! Frame struct and frame encoding.
//!
//! Uses `bytes::Bytes` for zero-copy payload sharing.
//!
//! # Example
//!
//! ```
//! use framelink::protocol::{build_frame, DEFAULT_VERSION, FRAME_OVERHEAD};
//!
//! let bytes = build_frame(DEFAULT_VERSION, b"hello").unwrap();
//! assert_eq!(bytes.len(), FRAME_OVERHEAD + 5);
//! assert_eq!(bytes[0], 0xAA);
//! assert_eq!(bytes[bytes.len() - 1], 0x55);
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use super::crc16::{crc16, crc16_update};
use super::wire_format::{Header, DEFAULT_VERSION, EOF, FRAME_OVERHEAD, MAX_PAYLOAD_SIZE};
use crate::error::{LinkError, Result};

/// A complete, validated protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Protocol version byte.
    pub version: u8,
    /// Payload bytes (zero-copy via `bytes::Bytes`).
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(version: u8, payload: Bytes) -> Self {
        Self { version, payload }
    }

    /// Create a frame with the default version, copying the payload.
    pub fn from_slice(payload: &[u8]) -> Self {
        Self {
            version: DEFAULT_VERSION,
            payload: Bytes::copy_from_slice(payload),
        }
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get the payload length.
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Size of this frame on the wire.
    #[inline]
    pub fn encoded_len(&self) -> usize {
        FRAME_OVERHEAD + self.payload.len()
    }

    /// Encode this frame to wire bytes.
    pub fn encode(&self) -> Result<Bytes> {
        build_frame(self.version, &self.payload)
    }
}

/// Build a complete wire frame around `payload`.
///
/// # Errors
///
/// Returns `PayloadTooLarge` if the payload exceeds [`MAX_PAYLOAD_SIZE`].
pub fn build_frame(version: u8, payload: &[u8]) -> Result<Bytes> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(LinkError::PayloadTooLarge {
            len: payload.len(),
            max: MAX_PAYLOAD_SIZE,
        });
    }

    // Guarded above: MAX_PAYLOAD_SIZE fits in u16.
    let header = Header::new(version, payload.len() as u16).encode();
    let crc = crc16_update(crc16(&header[1..]), payload);

    let mut buf = BytesMut::with_capacity(FRAME_OVERHEAD + payload.len());
    buf.put_slice(&header);
    buf.put_slice(payload);
    buf.put_u16(crc);
    buf.put_u8(EOF);
    Ok(buf.freeze())
}
