use bytes::{Bytes, BytesMut};

use super::{DecodeOutcome, MAX_READ_HINT};
use crate::config::{FrameConfig, HeaderFormat};
use crate::error::FrameError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Header,
    Body,
}

/// Length-prefixed decoder that reads header and body separately.
///
/// The body is read straight into an allocation of its exact size and handed
/// over without a copy. Output is always the body alone.
#[derive(Debug)]
pub struct NonCopy {
    header: HeaderFormat,
    max: usize,
    head: [u8; 8],
    body: BytesMut,
    phase: Phase,
}

impl NonCopy {
    pub fn new(config: &FrameConfig) -> Self {
        Self {
            header: config.header,
            max: config.max_msg_size,
            head: [0; 8],
            body: BytesMut::new(),
            phase: Phase::Header,
        }
    }

    /// Total length of the frame whose body is being read.
    pub fn current_msg_len(&self) -> Option<usize> {
        match self.phase {
            Phase::Header => None,
            Phase::Body => Some(self.header.len() + self.body.len()),
        }
    }

    pub fn reset(&mut self) {
        self.body = BytesMut::new();
        self.phase = Phase::Header;
    }

    pub fn next_read_size(&self, failed: bool, _transferred: usize) -> usize {
        if failed {
            0
        } else {
            MAX_READ_HINT
        }
    }

    /// Header slot or body allocation, depending on the phase.
    pub fn receive_region(&mut self) -> &mut [u8] {
        match self.phase {
            Phase::Header => &mut self.head[..self.header.len()],
            Phase::Body => &mut self.body[..],
        }
    }

    pub fn decode(&mut self, transferred: usize) -> DecodeOutcome {
        let mut out = DecodeOutcome::default();
        match self.phase {
            Phase::Header => {
                let head_len = self.header.len();
                if transferred != head_len {
                    out.error = Some(FrameError::LengthMismatch {
                        expected: head_len,
                        actual: transferred,
                    });
                    return out;
                }
                let len = self.header.read(&self.head);
                if len < head_len as u64 || len > self.max as u64 {
                    out.error = Some(FrameError::InvalidLength {
                        len,
                        min: head_len,
                        max: self.max,
                    });
                    return out;
                }
                let body_len = len as usize - head_len;
                if body_len == 0 {
                    out.messages.push(Bytes::new());
                } else {
                    self.body = BytesMut::zeroed(body_len);
                    self.phase = Phase::Body;
                }
            }
            Phase::Body => {
                if transferred != self.body.len() {
                    out.error = Some(FrameError::LengthMismatch {
                        expected: self.body.len(),
                        actual: transferred,
                    });
                    return out;
                }
                out.messages.push(self.body.split().freeze());
                self.phase = Phase::Header;
            }
        }
        out
    }
}
