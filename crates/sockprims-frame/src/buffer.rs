use bytes::BytesMut;

use crate::error::{FrameError, Result};

/// Capacity-bounded receive buffer.
///
/// Storage is allocated once at full capacity. Reads land in
/// [`RecvBuffer::writable`], are made visible with [`RecvBuffer::commit`] and
/// leave through [`RecvBuffer::consume`], which shifts the retained tail to
/// the front. `len()` never exceeds `capacity()`.
#[derive(Debug)]
pub struct RecvBuffer {
    storage: BytesMut,
    filled: usize,
}

impl RecvBuffer {
    /// Allocate a buffer holding at most `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            storage: BytesMut::zeroed(capacity),
            filled: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Number of committed, not yet consumed bytes.
    pub fn len(&self) -> usize {
        self.filled
    }

    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    /// Free space after the committed bytes.
    pub fn remaining(&self) -> usize {
        self.capacity() - self.filled
    }

    /// Committed bytes.
    pub fn filled(&self) -> &[u8] {
        &self.storage[..self.filled]
    }

    /// Committed bytes followed by `staged` bytes written but not yet committed.
    ///
    /// `staged` is clamped to the free space.
    pub fn staged(&self, staged: usize) -> &[u8] {
        let end = self.filled + staged.min(self.remaining());
        &self.storage[..end]
    }

    /// The free region where the next read should land.
    pub fn writable(&mut self) -> &mut [u8] {
        &mut self.storage[self.filled..]
    }

    /// Make `n` bytes previously written into [`RecvBuffer::writable`] visible.
    pub fn commit(&mut self, n: usize) -> Result<()> {
        if n > self.remaining() {
            return Err(FrameError::BufferOverflow {
                len: self.filled + n,
                capacity: self.capacity(),
            });
        }
        self.filled += n;
        Ok(())
    }

    /// Append bytes after the committed region.
    pub fn append(&mut self, data: &[u8]) -> Result<()> {
        if data.len() > self.remaining() {
            return Err(FrameError::BufferOverflow {
                len: self.filled + data.len(),
                capacity: self.capacity(),
            });
        }
        self.storage[self.filled..self.filled + data.len()].copy_from_slice(data);
        self.filled += data.len();
        Ok(())
    }

    /// Drop `n` bytes from the front, moving the remainder down.
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.filled);
        if n == 0 {
            return;
        }
        self.storage.copy_within(n..self.filled, 0);
        self.filled -= n;
    }

    pub fn clear(&mut self) {
        self.filled = 0;
    }
}
