//! Bridge framing for byte-stream links.
//!
//! A serial or TCP bridge that relays the circulator's characteristic cannot
//! preserve notification boundaries, so each stream message travels as a
//! frame with a direction byte and a 2-byte little-endian length:
//!
//! ```text
//! +--------+--------+--------+-------------------+
//! | header | len_lo | len_hi | data[0..len]      |
//! +--------+--------+--------+-------------------+
//! ```
//!
//! `'<'` marks host→device frames and `'>'` device→host frames.

use bytes::{Buf, BufMut, BytesMut};
use tracing::trace;

use crate::error::ProtocolError;

/// Maximum frame payload accepted.
pub const MAX_FRAMED_SIZE: usize = 1024;

/// Header byte for frames sent by the host.
pub const HOST_TO_DEVICE: u8 = b'<';

/// Header byte for frames sent by the device.
pub const DEVICE_TO_HOST: u8 = b'>';

const HEADER_LEN: usize = 3;

/// Accumulates bytes and splits them into frames with a given header byte.
#[derive(Debug)]
pub struct FrameCodec {
    buffer: BytesMut,
    header: u8,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCodec {
    /// A codec that decodes device→host frames (the host side of a bridge).
    pub fn new() -> Self {
        Self::with_header(DEVICE_TO_HOST)
    }

    /// A codec that decodes frames starting with `header`.
    ///
    /// A bridge that plays the device uses `HOST_TO_DEVICE`.
    pub fn with_header(header: u8) -> Self {
        FrameCodec {
            buffer: BytesMut::with_capacity(MAX_FRAMED_SIZE),
            header,
        }
    }

    /// Add received data to the buffer.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to decode a complete frame from the buffer.
    ///
    /// Returns `Some(frame_data)` if a complete frame is available,
    /// or `None` if more data is needed. Bytes before a header and headers
    /// declaring more than `MAX_FRAMED_SIZE` bytes are discarded.
    pub fn decode(&mut self) -> Option<Vec<u8>> {
        loop {
            let skipped = self
                .buffer
                .iter()
                .position(|b| *b == self.header)
                .unwrap_or(self.buffer.len());
            if skipped > 0 {
                trace!("FrameCodec: discarding {} bytes before header", skipped);
                self.buffer.advance(skipped);
            }

            if self.buffer.len() < HEADER_LEN {
                return None;
            }

            let len = u16::from_le_bytes([self.buffer[1], self.buffer[2]]) as usize;
            if len > MAX_FRAMED_SIZE {
                // Not a real header; resync on the next candidate
                trace!("FrameCodec: oversized length {}, resyncing", len);
                self.buffer.advance(1);
                continue;
            }

            if self.buffer.len() < HEADER_LEN + len {
                return None;
            }

            self.buffer.advance(HEADER_LEN);
            return Some(self.buffer.split_to(len).to_vec());
        }
    }

    /// Frame `data` for host→device transmission.
    ///
    /// Fails with [`ProtocolError::FrameTooLarge`] above [`MAX_FRAMED_SIZE`].
    pub fn encode(data: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        Self::encode_with_header(HOST_TO_DEVICE, data)
    }

    /// Frame `data` for device→host transmission.
    pub fn encode_device(data: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        Self::encode_with_header(DEVICE_TO_HOST, data)
    }

    fn encode_with_header(header: u8, data: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        let len = u16::try_from(data.len())
            .ok()
            .filter(|len| usize::from(*len) <= MAX_FRAMED_SIZE)
            .ok_or(ProtocolError::FrameTooLarge {
                len: data.len(),
                max: MAX_FRAMED_SIZE,
            })?;
        let mut buf = Vec::with_capacity(HEADER_LEN + data.len());
        buf.push(header);
        buf.put_u16_le(len);
        buf.extend_from_slice(data);
        Ok(buf)
    }

    /// Get the number of buffered bytes.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Clear the buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
