use bytes::Bytes;

use super::{DecodeOutcome, MAX_READ_HINT};
use crate::buffer::RecvBuffer;
use crate::error::FrameError;

fn one_shot(failed: bool, transferred: usize) -> usize {
    if failed || transferred > 0 {
        0
    } else {
        MAX_READ_HINT
    }
}

fn copy_out(buf: &RecvBuffer, transferred: usize, out: &mut DecodeOutcome) {
    if transferred > buf.capacity() {
        out.error = Some(FrameError::BufferOverflow {
            len: transferred,
            capacity: buf.capacity(),
        });
        return;
    }
    out.messages
        .push(Bytes::copy_from_slice(buf.staged(transferred)));
}

/// Unframed byte stream: whatever one read delivers is one message.
#[derive(Debug)]
pub struct Stream {
    buf: RecvBuffer,
}

impl Stream {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: RecvBuffer::new(capacity),
        }
    }

    pub fn next_read_size(&self, failed: bool, transferred: usize) -> usize {
        one_shot(failed, transferred)
    }

    pub fn receive_region(&mut self) -> &mut [u8] {
        self.buf.writable()
    }

    pub fn decode(&mut self, transferred: usize) -> DecodeOutcome {
        let mut out = DecodeOutcome::default();
        if transferred == 0 {
            out.error = Some(FrameError::EndOfStream);
        } else {
            copy_out(&self.buf, transferred, &mut out);
        }
        out
    }
}

/// Datagram framing: each delivery is one message, empty ones included.
#[derive(Debug)]
pub struct Datagram {
    buf: RecvBuffer,
}

impl Datagram {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: RecvBuffer::new(capacity),
        }
    }

    pub fn next_read_size(&self, failed: bool, transferred: usize) -> usize {
        one_shot(failed, transferred)
    }

    pub fn receive_region(&mut self) -> &mut [u8] {
        self.buf.writable()
    }

    pub fn decode(&mut self, transferred: usize) -> DecodeOutcome {
        let mut out = DecodeOutcome::default();
        copy_out(&self.buf, transferred, &mut out);
        out
    }
}
