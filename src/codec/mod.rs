//! Payload envelopes carried inside frames.
//!
//! The framing layer treats payloads as opaque bytes. The two sides of a
//! link agree on one envelope per direction:
//!
//! - [`RequestEnvelope`] - client to server: type, counter, content
//! - [`AckEnvelope`] - server to client: response code, timestamp, command
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use framelink::codec::{AckEnvelope, RequestEnvelope, RESP_OK};
//!
//! let request = RequestEnvelope::text(1, Bytes::from_static(b"ping"));
//! let decoded = RequestEnvelope::decode(&request.encode()).unwrap();
//! assert_eq!(decoded.msg_counter, 1);
//!
//! let ack = AckEnvelope::new(RESP_OK, 1_700_000_000_000, Some(9000));
//! let decoded = AckEnvelope::decode(&ack.encode()).unwrap();
//! assert_eq!(decoded.interval_override, Some(9000));
//! ```

mod ack;
mod request;

pub use ack::{
    AckEnvelope, ACK_MIN_SIZE, ACK_WITH_INTERVAL_SIZE, CMD_NONE, CMD_SET_INTERVAL, RESP_ERROR,
    RESP_OK,
};
pub use request::{MessageCounter, RequestEnvelope, MSG_TYPE_TEXT, REQUEST_HEADER_SIZE};
