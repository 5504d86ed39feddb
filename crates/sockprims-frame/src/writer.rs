use std::io::{ErrorKind, Write};
use std::net::TcpStream;

use bytes::BytesMut;

use crate::config::{FrameConfig, Framing};
use crate::error::{FrameError, Result};
use crate::pack::Packer;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes complete messages to any `Write` stream.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    packer: Packer,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    /// Create a writer for the default length-prefixed framing.
    pub fn new(inner: T) -> Result<Self> {
        Self::with_config(inner, &Framing::default(), FrameConfig::default())
    }

    /// Create a writer with explicit framing and configuration.
    pub fn with_config(inner: T, framing: &Framing, config: FrameConfig) -> Result<Self> {
        let packer = Packer::new(framing, &config)?;
        Ok(Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            packer,
            config,
        })
    }

    /// Frame and send one message (blocking).
    pub fn send(&mut self, msg: &[u8]) -> Result<()> {
        self.buf.clear();
        self.packer.pack(msg, &mut self.buf)?;

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }

    /// Send an empty message, which the peer sees as a heartbeat.
    pub fn send_heartbeat(&mut self) -> Result<()> {
        self.send(&[])
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    pub fn packer(&self) -> &Packer {
        &self.packer
    }

    /// Current frame writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl FrameWriter<TcpStream> {
    /// Create a frame writer for a TCP stream and apply the write timeout from config.
    pub fn with_config_tcp(inner: TcpStream, framing: &Framing, config: FrameConfig) -> Result<Self> {
        inner.set_write_timeout(config.write_timeout)?;
        Self::with_config(inner, framing, config)
    }
}
