//! Message framing for TCP byte streams.
//!
//! TCP delivers bytes, not messages. This crate restores message boundaries
//! under one of several wire formats:
//! - length-prefixed: `[length header][body]`, header width 1/2/4/8 bytes,
//!   either byte order, the header counting itself
//! - fixed-length: every message has the same size
//! - prefix/suffix: `[prefix][body][suffix]` with byte-literal delimiters
//! - non-copy: length-prefixed, read header-then-body into exact allocations
//! - stream and datagram: one read, one message
//!
//! The decoders are sans-io ([`Unpacker`]): they are driven by a read loop
//! ([`FrameReader`], [`AsyncFrameReader`]) or fed bytes directly
//! ([`Unpacker::feed`]). Messages that arrive before a framing violation
//! are always delivered.

pub mod buffer;
pub mod config;
pub mod error;
pub mod pack;
pub mod reader;
pub mod unpack;
pub mod writer;

#[cfg(feature = "async")]
pub mod async_io;

#[cfg(feature = "async")]
pub use async_io::{AsyncFrameReader, AsyncFrameWriter};
pub use buffer::RecvBuffer;
pub use config::{
    ByteOrder, FrameConfig, Framing, HeaderFormat, HeaderWidth, HeartbeatPolicy,
    DEFAULT_MAX_MSG_SIZE,
};
pub use error::{FrameError, Result};
pub use pack::Packer;
pub use reader::FrameReader;
pub use unpack::{DecodeOutcome, Unpacker, MAX_READ_HINT};
pub use writer::FrameWriter;
