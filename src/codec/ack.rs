//! Ack envelope - payload of a server-to-client frame.
//!
//! ```text
//! ┌──────────┬──────────────┬────────┬───────────────────────────┐
//! │ RespCode │ Timestamp ms │ CmdId  │ Forced interval ms        │
//! │ 1 byte   │ uint64 BE    │ 1 byte │ uint32 BE, iff CmdId=0x01 │
//! └──────────┴──────────────┴────────┴───────────────────────────┘
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{LinkError, Result};

/// Request processed.
pub const RESP_OK: u8 = 0x00;

/// Request rejected.
pub const RESP_ERROR: u8 = 0x01;

/// Plain acknowledgement.
pub const CMD_NONE: u8 = 0x00;

/// Acknowledgement carrying a forced send interval.
pub const CMD_SET_INTERVAL: u8 = 0x01;

/// RespCode + timestamp + CmdId.
pub const ACK_MIN_SIZE: usize = 10;

/// Ack with the interval directive.
pub const ACK_WITH_INTERVAL_SIZE: usize = 14;

/// Decoded ack envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckEnvelope {
    /// Response code.
    pub resp_code: u8,
    /// Server wall clock at ack-build time, ms since the Unix epoch.
    pub timestamp_ms: u64,
    /// Command byte.
    pub cmd_id: u8,
    /// Forced send interval, present only with `CMD_SET_INTERVAL`.
    pub interval_override: Option<u32>,
}

impl AckEnvelope {
    /// Build an ack; `cmd_id` follows from whether an override is given.
    pub fn new(resp_code: u8, timestamp_ms: u64, interval_override: Option<u32>) -> Self {
        Self {
            resp_code,
            timestamp_ms,
            cmd_id: if interval_override.is_some() {
                CMD_SET_INTERVAL
            } else {
                CMD_NONE
            },
            interval_override,
        }
    }

    /// Encode to payload bytes.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(ACK_WITH_INTERVAL_SIZE);
        buf.put_u8(self.resp_code);
        buf.put_u64(self.timestamp_ms);
        buf.put_u8(self.cmd_id);
        if let Some(interval) = self.interval_override {
            buf.put_u32(interval);
        }
        buf.freeze()
    }

    /// Decode from a frame payload.
    ///
    /// The interval is read only when `cmd_id` is `CMD_SET_INTERVAL` and all
    /// four bytes are present; a truncated directive decodes as a plain ack.
    ///
    /// # Errors
    ///
    /// Returns `MalformedAck` if the payload is shorter than [`ACK_MIN_SIZE`].
    pub fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < ACK_MIN_SIZE {
            return Err(LinkError::MalformedAck {
                len: payload.len(),
                min: ACK_MIN_SIZE,
            });
        }

        let mut ts = [0u8; 8];
        ts.copy_from_slice(&payload[1..9]);
        let cmd_id = payload[9];

        let interval_override = if cmd_id == CMD_SET_INTERVAL && payload.len() >= ACK_WITH_INTERVAL_SIZE {
            Some(u32::from_be_bytes([payload[10], payload[11], payload[12], payload[13]]))
        } else {
            None
        };

        Ok(Self {
            resp_code: payload[0],
            timestamp_ms: u64::from_be_bytes(ts),
            cmd_id,
            interval_override,
        })
    }

    /// Check if the server accepted the request.
    #[inline]
    pub fn is_ok(&self) -> bool {
        self.resp_code == RESP_OK
    }
}
