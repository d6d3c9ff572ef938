//! Length-prefixed framing over a byte stream
//!
//! Every frame on the wire is a 4-byte big-endian payload length followed by
//! exactly that many payload bytes. The decoder accumulates whatever the
//! transport hands it and yields complete payloads in arrival order, so the
//! way bytes are chunked by the socket never changes what comes out.

use crate::MAX_FRAME_LEN;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Size of the length prefix that precedes every payload
pub const HEADER_LEN: usize = 4;

/// Framing violations; the peer that produced one must be disconnected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame too large: {len} bytes (max {max})")]
    TooLarge { len: usize, max: usize },
}

/// Encodes a payload as a single frame
///
/// Payloads larger than [`MAX_FRAME_LEN`] are refused, since no conforming
/// peer would accept them.
pub fn encode_frame(payload: &[u8]) -> Result<Bytes, FrameError> {
    if payload.len() > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge {
            len: payload.len(),
            max: MAX_FRAME_LEN,
        });
    }

    let mut frame = BytesMut::with_capacity(HEADER_LEN + payload.len());
    frame.put_u32(payload.len() as u32);
    frame.put_slice(payload);
    Ok(frame.freeze())
}

/// Per-connection reassembly buffer for inbound frames
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends freshly received bytes to the accumulator
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Extracts the next complete payload, if one has fully arrived
    ///
    /// The length header is validated as soon as it is readable, so an
    /// oversized frame is rejected without waiting for its body.
    pub fn next_frame(&mut self) -> Result<Option<Bytes>, FrameError> {
        if self.buffer.len() < HEADER_LEN {
            return Ok(None);
        }

        let mut header = [0u8; HEADER_LEN];
        header.copy_from_slice(&self.buffer[..HEADER_LEN]);
        let len = u32::from_be_bytes(header) as usize;

        if len > MAX_FRAME_LEN {
            return Err(FrameError::TooLarge {
                len,
                max: MAX_FRAME_LEN,
            });
        }

        if self.buffer.len() < HEADER_LEN + len {
            return Ok(None);
        }

        self.buffer.advance(HEADER_LEN);
        Ok(Some(self.buffer.split_to(len).freeze()))
    }

    /// Appends bytes and drains every payload that is now complete
    ///
    /// On error nothing from this call is returned; callers that must act on
    /// frames preceding a bad header should drive [`Self::next_frame`] directly.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<Bytes>, FrameError> {
        self.extend(bytes);

        let mut payloads = Vec::new();
        while let Some(payload) = self.next_frame()? {
            payloads.push(payload);
        }
        Ok(payloads)
    }

    /// Number of buffered bytes not yet consumed as whole frames
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}
