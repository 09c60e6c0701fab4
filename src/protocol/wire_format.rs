//! Wire format constants and frame header encoding.
//!
//! Frame layout:
//! ```text
//! ┌──────┬─────────┬──────────┬──────────┬──────────┬──────┐
//! │ SOF  │ Version │ Length   │ Payload  │ CRC16    │ EOF  │
//! │ 0xAA │ 1 byte  │ uint16 BE│ N bytes  │ uint16 BE│ 0x55 │
//! └──────┴─────────┴──────────┴──────────┴──────────┴──────┘
//! ```
//!
//! The CRC covers `version ‖ length ‖ payload`. All multi-byte integers are
//! Big Endian.

use crate::error::FrameError;

/// Start-of-frame sentinel.
pub const SOF: u8 = 0xAA;

/// End-of-frame sentinel.
pub const EOF: u8 = 0x55;

/// The only protocol version this crate speaks.
pub const DEFAULT_VERSION: u8 = 0x01;

/// Maximum payload size in bytes.
pub const MAX_PAYLOAD_SIZE: usize = 4096;

/// SOF + version + length.
pub const HEADER_SIZE: usize = 4;

/// CRC + EOF.
pub const TRAILER_SIZE: usize = 3;

/// Fixed bytes around every payload.
pub const FRAME_OVERHEAD: usize = HEADER_SIZE + TRAILER_SIZE;

/// Decoded frame header (the part preceding the payload).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Protocol version byte.
    pub version: u8,
    /// Payload length in bytes.
    pub payload_length: u16,
}

impl Header {
    /// Create a new header.
    pub fn new(version: u8, payload_length: u16) -> Self {
        Self {
            version,
            payload_length,
        }
    }

    /// Encode header to bytes, SOF included.
    ///
    /// # Example
    ///
    /// ```
    /// use framelink::protocol::Header;
    ///
    /// let bytes = Header::new(1, 0x0102).encode();
    /// assert_eq!(bytes, [0xAA, 0x01, 0x01, 0x02]);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let len = self.payload_length.to_be_bytes();
        [SOF, self.version, len[0], len[1]]
    }

    /// Decode header from bytes starting at SOF.
    ///
    /// Returns `None` if the buffer is too short or does not start with SOF.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE || buf[0] != SOF {
            return None;
        }
        Some(Self {
            version: buf[1],
            payload_length: u16::from_be_bytes([buf[2], buf[3]]),
        })
    }

    /// Validate version and declared length, in that order.
    pub fn validate(&self, max_payload_size: usize) -> Result<(), FrameError> {
        if self.version != DEFAULT_VERSION {
            return Err(FrameError::UnsupportedVersion(self.version));
        }
        if usize::from(self.payload_length) > max_payload_size {
            return Err(FrameError::LengthTooLarge(self.payload_length));
        }
        Ok(())
    }

    /// Total encoded size of the frame this header announces.
    #[inline]
    pub fn frame_size(&self) -> usize {
        FRAME_OVERHEAD + usize::from(self.payload_length)
    }
}
