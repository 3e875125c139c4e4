//! Length-prefixed frame codec for the Scratch 1.4 Mesh transport
//!
//! # Wire Format
//!
//! Every logical message on the Mesh TCP transport is one frame:
//!
//! ```text
//! ┌──────────────────┬─────────────────────┐
//! │ Length (4 bytes) │ UTF-8 payload       │
//! │ Big-endian u32   │ (exactly N bytes)   │
//! └──────────────────┴─────────────────────┘
//! ```
//!
//! TCP delivers an arbitrarily-segmented byte stream, so one read may carry a
//! partial frame, exactly one frame, or several frames back to back.
//! [`FrameDecoder`] buffers unconsumed bytes across reads and yields as many
//! complete frames as are available; a trailing partial frame stays buffered
//! until the next read.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{RelayError, Result};

/// Size of the big-endian length prefix.
pub const HEADER_LEN: usize = 4;

/// Encode `payload` as one frame: 4-byte big-endian length, then the bytes.
///
/// Fails with [`RelayError::FrameTooLarge`] if the payload does not fit the
/// 32-bit length field; it is never silently truncated.
pub fn encode(payload: &[u8]) -> Result<Bytes> {
    let len = u32::try_from(payload.len()).map_err(|_| RelayError::FrameTooLarge {
        len: payload.len(),
    })?;
    let mut frame = BytesMut::with_capacity(HEADER_LEN + payload.len());
    frame.put_u32(len);
    frame.put_slice(payload);
    Ok(frame.freeze())
}

/// One complete inbound frame.
///
/// Keeps the original framed bytes so the relay can forward them to other
/// Mesh clients verbatim, byte for byte.
#[derive(Debug, Clone)]
pub struct Frame {
    raw: Bytes,
}

impl Frame {
    /// The full frame as received: header plus payload.
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    /// The payload bytes, without the length header.
    pub fn payload(&self) -> &[u8] {
        &self.raw[HEADER_LEN..]
    }
}

/// Stream-buffering frame decoder, one per Mesh connection.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::new(),
        }
    }

    /// Append one transport read to the internal buffer.
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Pop the next complete frame, or `None` if fewer than `4 + N` bytes
    /// are buffered. `None` means "wait for more bytes", not failure.
    ///
    /// Callers loop until `None` so that a single read yielding several
    /// coalesced frames dispatches all of them, in order.
    pub fn next_frame(&mut self) -> Option<Frame> {
        if self.buf.len() < HEADER_LEN {
            return None;
        }
        let mut header = [0u8; HEADER_LEN];
        header.copy_from_slice(&self.buf[..HEADER_LEN]);
        let payload_len = u32::from_be_bytes(header) as usize;
        if self.buf.len() < HEADER_LEN + payload_len {
            return None;
        }
        let raw = self.buf.split_to(HEADER_LEN + payload_len).freeze();
        Some(Frame { raw })
    }

    /// Bytes currently buffered without a complete frame in front of them.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}
