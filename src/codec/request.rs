//! Request envelope - payload of a client-to-server frame.
//!
//! ```text
//! ┌──────────┬─────────────┬──────────┐
//! │ Type     │ Msg counter │ Content  │
//! │ 1 byte   │ uint16 BE   │ N bytes  │
//! └──────────┴─────────────┴──────────┘
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{LinkError, Result};

/// Message type byte for text content (the only type clients send).
pub const MSG_TYPE_TEXT: u8 = 0x01;

/// Type + counter.
pub const REQUEST_HEADER_SIZE: usize = 3;

/// Decoded request envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestEnvelope {
    /// Message type byte.
    pub msg_type: u8,
    /// Per-session message counter (wraps at 65536).
    pub msg_counter: u16,
    /// Application content.
    pub content: Bytes,
}

impl RequestEnvelope {
    /// Create a text request.
    pub fn text(msg_counter: u16, content: Bytes) -> Self {
        Self {
            msg_type: MSG_TYPE_TEXT,
            msg_counter,
            content,
        }
    }

    /// Encode to payload bytes.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(REQUEST_HEADER_SIZE + self.content.len());
        buf.put_u8(self.msg_type);
        buf.put_u16(self.msg_counter);
        buf.put_slice(&self.content);
        buf.freeze()
    }

    /// Decode from a frame payload.
    ///
    /// # Errors
    ///
    /// Returns `MalformedRequest` if the payload is shorter than the
    /// fixed fields.
    pub fn decode(payload: &Bytes) -> Result<Self> {
        if payload.len() < REQUEST_HEADER_SIZE {
            return Err(LinkError::MalformedRequest {
                len: payload.len(),
                min: REQUEST_HEADER_SIZE,
            });
        }
        Ok(Self {
            msg_type: payload[0],
            msg_counter: u16::from_be_bytes([payload[1], payload[2]]),
            content: payload.slice(REQUEST_HEADER_SIZE..),
        })
    }
}

/// Monotonic message counter owned by one sending session.
///
/// Starts at 1 and wraps at 65536.
#[derive(Debug, Clone)]
pub struct MessageCounter {
    next: u16,
}

impl MessageCounter {
    /// Create a counter whose first value is 1.
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Return the current value and advance.
    pub fn next_value(&mut self) -> u16 {
        let value = self.next;
        self.next = self.next.wrapping_add(1);
        value
    }

    /// Peek at the value the next request will carry.
    pub fn peek(&self) -> u16 {
        self.next
    }
}

impl Default for MessageCounter {
    fn default() -> Self {
        Self::new()
    }
}
