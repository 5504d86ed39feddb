use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Default maximum message size (header included): 4000 bytes.
pub const DEFAULT_MAX_MSG_SIZE: usize = 4000;

/// Width of a length header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeaderWidth {
    U8,
    U16,
    U32,
    U64,
}

impl HeaderWidth {
    /// Width in bytes.
    pub fn bytes(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
            Self::U32 => 4,
            Self::U64 => 8,
        }
    }

    /// Largest length value the header can carry.
    pub fn max_value(self) -> u64 {
        match self {
            Self::U8 => u8::MAX as u64,
            Self::U16 => u16::MAX as u64,
            Self::U32 => u32::MAX as u64,
            Self::U64 => u64::MAX,
        }
    }

    /// Look up a width by its size in bytes.
    pub fn from_bytes(width: usize) -> Option<Self> {
        match width {
            1 => Some(Self::U8),
            2 => Some(Self::U16),
            4 => Some(Self::U32),
            8 => Some(Self::U64),
            _ => None,
        }
    }
}

/// Byte order of a length header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ByteOrder {
    /// Network byte order.
    #[default]
    BigEndian,
    LittleEndian,
}

/// Layout of the length header used by length-prefixed and zero-copy framing.
///
/// The header value is the *total* frame length, header included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeaderFormat {
    pub width: HeaderWidth,
    pub order: ByteOrder,
}

impl Default for HeaderFormat {
    fn default() -> Self {
        Self {
            width: HeaderWidth::U16,
            order: ByteOrder::BigEndian,
        }
    }
}

impl HeaderFormat {
    /// Header width in bytes.
    pub fn len(&self) -> usize {
        self.width.bytes()
    }

    /// Always false; headers have a non-zero width.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Decode a header from the first `len()` bytes of `src`.
    ///
    /// `src` must hold at least `len()` bytes.
    pub fn read(&self, src: &[u8]) -> u64 {
        let width = self.len();
        let mut head = &src[..width];
        match self.order {
            ByteOrder::BigEndian => head.get_uint(width),
            ByteOrder::LittleEndian => head.get_uint_le(width),
        }
    }

    /// Append a header carrying `total_len`.
    pub fn write(&self, total_len: usize, dst: &mut BytesMut) -> Result<()> {
        let value = total_len as u64;
        if value > self.width.max_value() {
            return Err(FrameError::MessageTooLarge {
                size: total_len,
                max: self.width.max_value() as usize,
            });
        }
        match self.order {
            ByteOrder::BigEndian => dst.put_uint(value, self.len()),
            ByteOrder::LittleEndian => dst.put_uint_le(value, self.len()),
        }
        Ok(())
    }
}

/// What to do with heartbeat messages (frames with an empty body).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeartbeatPolicy {
    /// Drop heartbeats before they reach the application.
    #[default]
    Suppress,
    /// Hand heartbeats to the application like any other message.
    Surface,
}

/// Which wire format a connection speaks.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Framing {
    /// `[length header][body]`, header counts itself.
    #[default]
    LengthPrefixed,
    /// Every message is exactly this many bytes, no header.
    FixedLength(usize),
    /// `[prefix][body][suffix]`; the suffix must not be empty.
    PrefixSuffix { prefix: Bytes, suffix: Bytes },
    /// Length-prefixed wire format read header-then-body into exact allocations.
    NonCopy,
    /// No framing; every read is one message.
    Stream,
    /// Boundaries come from the transport; every delivery is one message.
    Datagram,
}

impl Framing {
    /// Convenience constructor for delimited framing.
    pub fn prefix_suffix(prefix: impl Into<Bytes>, suffix: impl Into<Bytes>) -> Self {
        Self::PrefixSuffix {
            prefix: prefix.into(),
            suffix: suffix.into(),
        }
    }

    /// Short name for logs and diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Self::LengthPrefixed => "length-prefixed",
            Self::FixedLength(_) => "fixed-length",
            Self::PrefixSuffix { .. } => "prefix-suffix",
            Self::NonCopy => "non-copy",
            Self::Stream => "stream",
            Self::Datagram => "datagram",
        }
    }

    /// Check this framing against the shared configuration.
    pub fn validate(&self, config: &FrameConfig) -> Result<()> {
        config.validate()?;
        match self {
            Self::FixedLength(len) if *len == 0 || *len > config.max_msg_size => {
                Err(FrameError::InvalidConfig(format!(
                    "fixed length {len} must be within 1..={}",
                    config.max_msg_size
                )))
            }
            Self::PrefixSuffix { suffix, .. } if suffix.is_empty() => Err(
                FrameError::InvalidConfig("suffix must not be empty".to_string()),
            ),
            Self::PrefixSuffix { prefix, suffix }
                if prefix.len() + suffix.len() >= config.max_msg_size =>
            {
                Err(FrameError::InvalidConfig(format!(
                    "prefix and suffix ({} bytes) must be shorter than max message size {}",
                    prefix.len() + suffix.len(),
                    config.max_msg_size
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Configuration shared by every framing variant.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum message size in bytes (header/delimiters included). Default: 4000.
    pub max_msg_size: usize,
    /// Length header layout. Default: 2 bytes, big-endian.
    pub header: HeaderFormat,
    /// Emit bodies without header or delimiters. Default: true.
    pub strip: bool,
    /// Heartbeat handling at the reader level. Default: suppress.
    pub heartbeat: HeartbeatPolicy,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_msg_size: DEFAULT_MAX_MSG_SIZE,
            header: HeaderFormat::default(),
            strip: true,
            heartbeat: HeartbeatPolicy::default(),
            read_timeout: None,
            write_timeout: None,
        }
    }
}

impl FrameConfig {
    /// Check the framing-independent settings.
    pub fn validate(&self) -> Result<()> {
        if self.max_msg_size <= self.header.len() {
            return Err(FrameError::InvalidConfig(format!(
                "max message size {} must exceed header width {}",
                self.max_msg_size,
                self.header.len()
            )));
        }
        Ok(())
    }
}
