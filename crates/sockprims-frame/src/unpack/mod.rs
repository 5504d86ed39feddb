//! Incremental message decoders.
//!
//! Every decoder follows the same protocol, driven by a read loop:
//!
//! 1. [`Unpacker::prepare_receive_region`] once per read operation, then read
//!    into [`Unpacker::receive_region`].
//! 2. After each chunk, ask [`Unpacker::next_read_size`] with the running
//!    byte count. A zero means "stop reading and decode".
//! 3. [`Unpacker::decode`] the whole read operation. It returns every complete
//!    message plus the first violation, if any.
//!
//! [`Unpacker::feed`] runs the same protocol over caller-supplied bytes.

mod delimited;
mod fixed;
mod length;
mod non_copy;
mod stream;

pub use delimited::PrefixSuffix;
pub use fixed::FixedLength;
pub use length::LengthPrefixed;
pub use non_copy::NonCopy;
pub use stream::{Datagram, Stream};

use bytes::Bytes;

use crate::config::{FrameConfig, Framing};
use crate::error::{FrameError, Result};

/// Read hint returned while a decoder wants more bytes.
pub const MAX_READ_HINT: usize = 64 * 1024;

/// Result of one decode step.
///
/// Messages decoded before a violation are kept: the caller delivers them,
/// then tears the connection down.
#[derive(Debug, Default)]
pub struct DecodeOutcome {
    /// Complete messages, in wire order.
    pub messages: Vec<Bytes>,
    /// Bytes held back as the start of the next message.
    pub retained: usize,
    /// First violation hit; decoding stopped there.
    pub error: Option<FrameError>,
}

impl DecodeOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Messages, or the error if there was one.
    pub fn into_result(self) -> Result<Vec<Bytes>> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.messages),
        }
    }

    fn absorb(&mut self, step: DecodeOutcome) {
        self.messages.extend(step.messages);
        if self.error.is_none() {
            self.error = step.error;
        }
    }
}

#[derive(Debug)]
enum Variant {
    LengthPrefixed(LengthPrefixed),
    FixedLength(FixedLength),
    PrefixSuffix(PrefixSuffix),
    NonCopy(NonCopy),
    Stream(Stream),
    Datagram(Datagram),
}

macro_rules! dispatch {
    ($variant:expr, $u:ident => $body:expr) => {
        match $variant {
            Variant::LengthPrefixed($u) => $body,
            Variant::FixedLength($u) => $body,
            Variant::PrefixSuffix($u) => $body,
            Variant::NonCopy($u) => $body,
            Variant::Stream($u) => $body,
            Variant::Datagram($u) => $body,
        }
    };
}

/// A decoder for one of the supported framings.
#[derive(Debug)]
pub struct Unpacker {
    variant: Variant,
    /// Bytes written by [`Unpacker::feed`] into the current region, not yet decoded.
    staged: usize,
}

impl Unpacker {
    /// Build the decoder for `framing`, validating the configuration first.
    pub fn new(framing: &Framing, config: &FrameConfig) -> Result<Self> {
        framing.validate(config)?;
        let variant = match framing {
            Framing::LengthPrefixed => Variant::LengthPrefixed(LengthPrefixed::new(config)),
            Framing::FixedLength(len) => Variant::FixedLength(FixedLength::new(*len)),
            Framing::PrefixSuffix { prefix, suffix } => {
                Variant::PrefixSuffix(PrefixSuffix::new(prefix.clone(), suffix.clone(), config))
            }
            Framing::NonCopy => Variant::NonCopy(NonCopy::new(config)),
            Framing::Stream => Variant::Stream(Stream::new(config.max_msg_size)),
            Framing::Datagram => Variant::Datagram(Datagram::new(config.max_msg_size)),
        };
        Ok(Self { variant, staged: 0 })
    }

    /// Short name of the framing, for logs.
    pub fn kind(&self) -> &'static str {
        match self.variant {
            Variant::LengthPrefixed(_) => "length-prefixed",
            Variant::FixedLength(_) => "fixed-length",
            Variant::PrefixSuffix(_) => "prefix-suffix",
            Variant::NonCopy(_) => "non-copy",
            Variant::Stream(_) => "stream",
            Variant::Datagram(_) => "datagram",
        }
    }

    /// Discard all buffered state, ready for a fresh connection.
    pub fn reset(&mut self) {
        self.staged = 0;
        match &mut self.variant {
            Variant::LengthPrefixed(u) => u.reset(),
            Variant::FixedLength(u) => u.reset(),
            Variant::PrefixSuffix(u) => u.reset(),
            Variant::NonCopy(u) => u.reset(),
            Variant::Stream(_) | Variant::Datagram(_) => {}
        }
    }

    /// Bytes committed and held back as a partial message.
    pub fn buffered(&self) -> usize {
        match &self.variant {
            Variant::LengthPrefixed(u) => u.buffered(),
            Variant::PrefixSuffix(u) => u.buffered(),
            _ => 0,
        }
    }

    /// How many more bytes the current read should request; 0 stops the read.
    ///
    /// `transferred` counts the bytes received so far in this read operation.
    pub fn next_read_size(&mut self, failed: bool, transferred: usize) -> usize {
        dispatch!(&mut self.variant, u => u.next_read_size(failed, transferred))
    }

    /// Set up the region for a new read operation and return it.
    ///
    /// Call once per read operation, before the first read.
    pub fn prepare_receive_region(&mut self) -> &mut [u8] {
        match &mut self.variant {
            Variant::FixedLength(u) => u.prepare_receive_region(),
            other => dispatch!(other, u => u.receive_region()),
        }
    }

    /// The region of the read operation in progress.
    pub fn receive_region(&mut self) -> &mut [u8] {
        dispatch!(&mut self.variant, u => u.receive_region())
    }

    /// Decode after a read operation that placed `transferred` bytes in the region.
    pub fn decode(&mut self, transferred: usize) -> DecodeOutcome {
        dispatch!(&mut self.variant, u => u.decode(transferred))
    }

    /// Whether `msg`, as emitted by this decoder, is a heartbeat.
    pub fn is_heartbeat(&self, msg: &[u8]) -> bool {
        match &self.variant {
            Variant::LengthPrefixed(u) => u.is_heartbeat(msg),
            Variant::PrefixSuffix(u) => u.is_heartbeat(msg),
            Variant::NonCopy(_) => msg.is_empty(),
            Variant::FixedLength(_) | Variant::Stream(_) | Variant::Datagram(_) => false,
        }
    }

    /// Push received bytes through the decoder without any I/O.
    ///
    /// Bytes are staged across calls until the decoder asks for a decode or
    /// the region fills. For datagram framing every call is one datagram;
    /// for stream framing an empty slice is end of stream.
    pub fn feed(&mut self, mut data: &[u8]) -> DecodeOutcome {
        let mut out = DecodeOutcome::default();

        if data.is_empty() {
            match self.variant {
                Variant::Stream(_) | Variant::Datagram(_) => return self.decode(0),
                _ => {
                    out.retained = self.buffered() + self.staged;
                    return out;
                }
            }
        }

        if let Variant::Datagram(_) = self.variant {
            let region = self.prepare_receive_region();
            if data.len() > region.len() {
                out.error = Some(FrameError::BufferOverflow {
                    len: data.len(),
                    capacity: region.len(),
                });
                return out;
            }
            region[..data.len()].copy_from_slice(data);
            return self.decode(data.len());
        }

        while !data.is_empty() {
            let staged = self.staged;
            let region = if staged == 0 {
                self.prepare_receive_region()
            } else {
                self.receive_region()
            };
            let region_len = region.len();
            let n = (region_len - staged).min(data.len());
            if n == 0 {
                out.error = Some(FrameError::BufferOverflow {
                    len: self.buffered() + staged + data.len(),
                    capacity: self.buffered() + region_len,
                });
                break;
            }
            region[staged..staged + n].copy_from_slice(&data[..n]);
            data = &data[n..];
            self.staged += n;

            if self.next_read_size(false, self.staged) == 0 || self.staged == region_len {
                let transferred = std::mem::take(&mut self.staged);
                out.absorb(self.decode(transferred));
                if out.error.is_some() {
                    break;
                }
            }
        }

        out.retained = self.buffered() + self.staged;
        out
    }
}
