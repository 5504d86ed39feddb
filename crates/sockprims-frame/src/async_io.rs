use std::io::ErrorKind;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::config::{FrameConfig, Framing};
use crate::error::{FrameError, Result};
use crate::pack::Packer;
use crate::reader::Inbox;
use crate::unpack::Unpacker;

/// Async counterpart of [`crate::FrameReader`].
///
/// Cancel safe: dropping a pending `read_*` future loses no bytes, the read
/// operation resumes on the next call.
pub struct AsyncFrameReader<R> {
    inner: R,
    unpacker: Unpacker,
    inbox: Inbox,
    staged: Option<usize>,
}

impl<R: AsyncRead + Unpin> AsyncFrameReader<R> {
    pub fn new(inner: R, framing: &Framing, config: &FrameConfig) -> Result<Self> {
        let unpacker = Unpacker::new(framing, config)?;
        Ok(Self::with_unpacker(inner, unpacker, config))
    }

    /// Reuse an existing decoder, keeping whatever it has buffered.
    pub fn with_unpacker(inner: R, unpacker: Unpacker, config: &FrameConfig) -> Self {
        Self {
            inner,
            unpacker,
            inbox: Inbox::new(config.heartbeat),
            staged: None,
        }
    }

    /// All messages produced by the next read operation (at least one).
    ///
    /// A violation is reported only after the messages decoded ahead of it.
    pub async fn read_batch(&mut self) -> Result<Vec<Bytes>> {
        loop {
            if let Some(next) = self.inbox.next_batch() {
                return next;
            }
            self.fill().await?;
        }
    }

    pub async fn read_message(&mut self) -> Result<Bytes> {
        loop {
            if let Some(next) = self.inbox.next() {
                return next;
            }
            self.fill().await?;
        }
    }

    async fn fill(&mut self) -> Result<()> {
        let mut transferred = match self.staged {
            Some(n) => n,
            None => {
                self.unpacker.prepare_receive_region();
                0
            }
        };
        self.staged = Some(transferred);

        loop {
            let region_len = self.unpacker.receive_region().len();
            let hint = self.unpacker.next_read_size(false, transferred);
            if hint == 0 || transferred == region_len {
                break;
            }

            let end = transferred + hint.min(region_len - transferred);
            let region = self.unpacker.receive_region();
            match self.inner.read(&mut region[transferred..end]).await {
                Ok(0) => {
                    self.staged = None;
                    return Err(FrameError::ConnectionClosed);
                }
                Ok(n) => {
                    transferred += n;
                    self.staged = Some(transferred);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    self.staged = None;
                    self.unpacker.next_read_size(true, transferred);
                    return Err(FrameError::Io(err));
                }
            }
        }

        self.staged = None;
        let outcome = self.unpacker.decode(transferred);
        trace!(
            framing = self.unpacker.kind(),
            transferred,
            messages = outcome.messages.len(),
            retained = outcome.retained,
            "decoded read"
        );
        self.inbox.absorb(outcome, &self.unpacker);
        Ok(())
    }

    pub fn unpacker(&self) -> &Unpacker {
        &self.unpacker
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Split back into the stream and the decoder.
    pub fn into_parts(self) -> (R, Unpacker) {
        (self.inner, self.unpacker)
    }

    /// Drop the stream, keeping the decoder for the next connection.
    pub fn into_unpacker(self) -> Unpacker {
        self.unpacker
    }
}

/// Async counterpart of [`crate::FrameWriter`].
pub struct AsyncFrameWriter<W> {
    inner: W,
    buf: BytesMut,
    packer: Packer,
}

impl<W: AsyncWrite + Unpin> AsyncFrameWriter<W> {
    pub fn new(inner: W, framing: &Framing, config: &FrameConfig) -> Result<Self> {
        Ok(Self::with_packer(inner, Packer::new(framing, config)?))
    }

    pub fn with_packer(inner: W, packer: Packer) -> Self {
        Self {
            inner,
            buf: BytesMut::new(),
            packer,
        }
    }

    /// Frame and send one message.
    pub async fn send(&mut self, msg: &[u8]) -> Result<()> {
        self.buf.clear();
        self.packer.pack(msg, &mut self.buf)?;
        self.send_packed().await
    }

    /// Send bytes already framed by a [`Packer`] for this connection.
    pub async fn send_raw(&mut self, wire: &Bytes) -> Result<()> {
        self.inner.write_all(wire).await?;
        self.inner.flush().await?;
        Ok(())
    }

    async fn send_packed(&mut self) -> Result<()> {
        self.inner.write_all(&self.buf).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Shut down the write direction. The peer reads EOF once it drains.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner.shutdown().await?;
        Ok(())
    }

    pub fn packer(&self) -> &Packer {
        &self.packer
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}
