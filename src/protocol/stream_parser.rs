//! Incremental stream parser with resynchronization.
//!
//! Uses `bytes::BytesMut` for buffer management. Each call to
//! [`StreamParser::next_frame`] scans for SOF, validates the candidate frame
//! (version, length, EOF, then CRC) and either yields it or drops
//! exactly one leading byte and retries. Every iteration strictly shrinks the
//! buffer or returns, so a corrupted stream always makes progress.
//!
//! # Example
//!
//! ```
//! use framelink::protocol::{build_frame, ParseEvent, StreamParser, DEFAULT_VERSION};
//!
//! let mut parser = StreamParser::new();
//! let bytes = build_frame(DEFAULT_VERSION, b"hello").unwrap();
//!
//! // Data arrives in chunks from the socket
//! assert!(parser.push(&bytes[..3]).is_empty());
//! let events = parser.push(&bytes[3..]);
//!
//! assert!(matches!(&events[..], [ParseEvent::Frame(f)] if f.payload() == b"hello"));
//! ```

use bytes::BytesMut;

use super::crc16::crc16;
use super::wire_format::{Header, EOF, FRAME_OVERHEAD, HEADER_SIZE, MAX_PAYLOAD_SIZE, SOF, TRAILER_SIZE};
use super::Frame;
use crate::error::FrameError;

/// Outcome of one [`StreamParser::next_frame`] call.
///
/// `error` holds the last resynchronization error hit during the call; it can
/// accompany a frame when corrupted bytes preceded a valid one.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct NextFrame {
    /// A complete, validated frame.
    pub frame: Option<Frame>,
    /// Last validation failure encountered while scanning.
    pub error: Option<FrameError>,
}

impl NextFrame {
    /// No frame and no error: the buffer needs more data (or is empty).
    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.frame.is_none() && self.error.is_none()
    }
}

/// Ordered parser output produced by [`StreamParser::push`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseEvent {
    /// Bytes were discarded while resynchronizing.
    Malformed(FrameError),
    /// A complete frame.
    Frame(Frame),
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
pub struct StreamParser {
    /// Accumulated bytes from socket reads.
    buffer: BytesMut,
    /// Maximum allowed payload size.
    max_payload_size: usize,
}

impl StreamParser {
    /// Create a new parser with the protocol maximum payload size.
    pub fn new() -> Self {
        Self::with_max_payload(MAX_PAYLOAD_SIZE)
    }

    /// Create a new parser with a smaller payload limit.
    ///
    /// The limit is clamped to [`MAX_PAYLOAD_SIZE`].
    pub fn with_max_payload(max_payload_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(2 * (FRAME_OVERHEAD + MAX_PAYLOAD_SIZE)),
            max_payload_size: max_payload_size.min(MAX_PAYLOAD_SIZE),
        }
    }

    /// Append data to the buffer without extracting frames.
    pub fn append(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Push data into the buffer and drain every frame and error it yields.
    ///
    /// Events keep stream order: every resync error is reported before the
    /// frame that followed the corrupted bytes.
    pub fn push(&mut self, data: &[u8]) -> Vec<ParseEvent> {
        self.append(data);

        let mut events = Vec::new();
        let mut errors = Vec::new();
        loop {
            let frame = self.scan(&mut errors);
            let exhausted = frame.is_none() && errors.is_empty();
            events.extend(errors.drain(..).map(ParseEvent::Malformed));
            match frame {
                Some(frame) => events.push(ParseEvent::Frame(frame)),
                None if exhausted => break,
                None => {}
            }
        }
        events
    }

    /// Try to extract a single frame from the buffer.
    ///
    /// Returns at most one frame. Call repeatedly until
    /// [`NextFrame::is_exhausted`] to drain the buffer.
    pub fn next_frame(&mut self) -> NextFrame {
        let mut errors = Vec::new();
        let frame = self.scan(&mut errors);
        NextFrame {
            frame,
            error: errors.pop(),
        }
    }

    /// One scan pass: appends each resync failure to `errors` and stops at
    /// the first complete frame or when more data is needed.
    fn scan(&mut self, errors: &mut Vec<FrameError>) -> Option<Frame> {
        loop {
            let Some(sof_index) = self.buffer.iter().position(|&b| b == SOF) else {
                // Total desync: nothing here can start a frame.
                if !self.buffer.is_empty() {
                    self.buffer.clear();
                    errors.push(FrameError::MissingSof);
                }
                return None;
            };

            if sof_index > 0 {
                let _ = self.buffer.split_to(sof_index);
            }

            if self.buffer.len() < FRAME_OVERHEAD {
                return None;
            }

            let header = Header::decode(&self.buffer[..HEADER_SIZE])?;

            if let Err(e) = header.validate(self.max_payload_size) {
                self.skip_one();
                errors.push(e);
                continue;
            }

            let frame_size = header.frame_size();
            if self.buffer.len() < frame_size {
                return None;
            }

            let eof = self.buffer[frame_size - 1];
            if eof != EOF {
                self.skip_one();
                errors.push(FrameError::InvalidEof(eof));
                continue;
            }

            let crc_offset = frame_size - TRAILER_SIZE;
            let received = u16::from_be_bytes([self.buffer[crc_offset], self.buffer[crc_offset + 1]]);
            let calculated = crc16(&self.buffer[1..crc_offset]);
            if calculated != received {
                self.skip_one();
                errors.push(FrameError::InvalidCrc {
                    calculated,
                    received,
                });
                continue;
            }

            let raw = self.buffer.split_to(frame_size).freeze();
            let payload = raw.slice(HEADER_SIZE..crc_offset);
            return Some(Frame::new(header.version, payload));
        }
    }

    /// Drop the leading byte so the SOF search restarts past it.
    #[inline]
    fn skip_one(&mut self) {
        let _ = self.buffer.split_to(1);
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Discard all buffered bytes.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for StreamParser {
    fn default() -> Self {
        Self::new()
    }
}
