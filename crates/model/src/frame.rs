//! Wire framing shared by the file and tcp transports
//!
//! One frame carries one record:
//!
//! ```text
//! [4 bytes: frame length, big-endian]
//! [2 bytes: partition key length, big-endian]
//! [key bytes][payload bytes]
//! ```
//!
//! The frame length covers everything after the length word itself. The
//! partition key travels with the record so a downstream consumer can keep
//! the routing hint; sources that re-ingest frames only care about the
//! payload.

use bytes::{Buf, BytesMut};
use thiserror::Error;

/// Upper bound on a single frame, comfortably above the record size
/// ceiling plus key overhead. Larger frames indicate corruption.
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// One decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub partition_key: String,
    pub payload: Vec<u8>,
}

/// Framing errors are not recoverable within a stream; the reader should
/// abandon the connection or report the file corrupt.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame of {length} bytes exceeds the {MAX_FRAME_BYTES} byte limit")]
    Oversized { length: usize },

    #[error("frame length {length} is too short to hold a key length")]
    Truncated { length: usize },

    #[error("partition key length {key_len} does not fit in frame of {length} bytes")]
    KeyOverrun { key_len: usize, length: usize },

    #[error("partition key is not valid UTF-8")]
    KeyEncoding,
}

/// Encode one record into a frame.
pub fn encode_frame(partition_key: &str, payload: &[u8]) -> Vec<u8> {
    let key = partition_key.as_bytes();
    let frame_len = 2 + key.len() + payload.len();

    let mut out = Vec::with_capacity(4 + frame_len);
    out.extend_from_slice(&(frame_len as u32).to_be_bytes());
    out.extend_from_slice(&(key.len() as u16).to_be_bytes());
    out.extend_from_slice(key);
    out.extend_from_slice(payload);
    out
}

/// Incremental frame decoder.
///
/// Feed it byte chunks as they arrive; it yields complete frames and keeps
/// partial input buffered.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append newly read bytes.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Bytes currently buffered but not yet consumed as frames.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Try to decode the next complete frame.
    ///
    /// Returns `Ok(None)` when more input is needed.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, FrameError> {
        if self.buf.len() < 4 {
            return Ok(None);
        }

        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&self.buf[..4]);
        let frame_len = u32::from_be_bytes(len_bytes) as usize;

        if frame_len > MAX_FRAME_BYTES {
            return Err(FrameError::Oversized { length: frame_len });
        }
        if frame_len < 2 {
            return Err(FrameError::Truncated { length: frame_len });
        }
        if self.buf.len() < 4 + frame_len {
            return Ok(None);
        }

        self.buf.advance(4);
        let mut frame = self.buf.split_to(frame_len);

        let key_len = u16::from_be_bytes([frame[0], frame[1]]) as usize;
        frame.advance(2);

        if key_len > frame.len() {
            return Err(FrameError::KeyOverrun {
                key_len,
                length: frame_len,
            });
        }

        let key = frame.split_to(key_len);
        let partition_key =
            std::str::from_utf8(&key).map_err(|_| FrameError::KeyEncoding)?.to_owned();

        Ok(Some(Frame {
            partition_key,
            payload: frame.to_vec(),
        }))
    }
}
