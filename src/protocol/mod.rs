//! Protocol module - checksum, wire format, framing, and stream parsing.
//!
//! This module implements the binary frame layer:
//! - CRC-16 over `version ‖ length ‖ payload`
//! - Frame encoding with SOF/EOF sentinels
//! - Incremental stream parser with byte-wise resynchronization

mod crc16;
mod frame;
mod stream_parser;
mod wire_format;

pub use crc16::{crc16, crc16_update, CRC16_INIT, CRC16_POLY};
pub use frame::{build_frame, Frame};
pub use stream_parser::{NextFrame, ParseEvent, StreamParser};
pub use wire_format::{
    Header, DEFAULT_VERSION, EOF, FRAME_OVERHEAD, HEADER_SIZE, MAX_PAYLOAD_SIZE, SOF,
    TRAILER_SIZE,
};
