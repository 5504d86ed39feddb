use bytes::BytesMut;

use super::{DecodeOutcome, MAX_READ_HINT};
use crate::error::FrameError;

/// Decoder for messages of one fixed size.
///
/// Each message gets its own allocation, handed to the caller without a copy.
#[derive(Debug)]
pub struct FixedLength {
    len: usize,
    body: BytesMut,
}

impl FixedLength {
    pub fn new(len: usize) -> Self {
        Self {
            len,
            body: BytesMut::new(),
        }
    }

    /// The configured message size.
    pub fn message_len(&self) -> usize {
        self.len
    }

    pub fn reset(&mut self) {
        self.body = BytesMut::new();
    }

    pub fn next_read_size(&self, failed: bool, transferred: usize) -> usize {
        if failed || transferred >= self.len {
            0
        } else {
            MAX_READ_HINT
        }
    }

    /// Allocate a fresh message-sized region.
    pub fn prepare_receive_region(&mut self) -> &mut [u8] {
        self.body = BytesMut::zeroed(self.len);
        &mut self.body[..]
    }

    pub fn receive_region(&mut self) -> &mut [u8] {
        &mut self.body[..]
    }

    pub fn decode(&mut self, transferred: usize) -> DecodeOutcome {
        let mut out = DecodeOutcome::default();
        if transferred != self.len || self.body.len() != self.len {
            out.error = Some(FrameError::LengthMismatch {
                expected: self.len,
                actual: transferred,
            });
            return out;
        }
        out.messages.push(self.body.split().freeze());
        out
    }
}
