/// Errors that can occur during message framing.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A header decoded to a length outside `[min, max]`.
    #[error("invalid message length {len} (allowed {min}..={max})")]
    InvalidLength { len: u64, min: usize, max: usize },

    /// Buffered data does not start with the configured prefix.
    #[error("message does not start with the configured prefix")]
    PrefixMismatch,

    /// The receive buffer filled up without a suffix being found.
    #[error("no suffix found within {max} bytes")]
    SuffixNotFound { max: usize },

    /// Committing the delivered bytes would overrun the receive buffer.
    #[error("receive buffer overflow ({len} bytes, capacity {capacity})")]
    BufferOverflow { len: usize, capacity: usize },

    /// A decode call did not consume a single complete message.
    #[error("no complete message in {buffered} buffered bytes")]
    NoProgress { buffered: usize },

    /// A delivery did not match the exact size the receive region was prepared for.
    #[error("expected exactly {expected} bytes, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// A raw stream delivery carried zero bytes.
    #[error("end of stream")]
    EndOfStream,

    /// A message to encode contains the suffix literal.
    #[error("message body contains the suffix delimiter")]
    SuffixInBody,

    /// A message to encode exceeds the configured maximum.
    #[error("message too large ({size} bytes, max {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// The framing configuration is unusable.
    #[error("invalid framing configuration: {0}")]
    InvalidConfig(String),

    /// An I/O error occurred while reading or writing messages.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete message was received.
    #[error("connection closed (incomplete message)")]
    ConnectionClosed,

    /// A previous framing violation left the stream without message boundaries.
    #[error("stream desynchronized by an earlier framing violation")]
    Desynchronized,
}

impl FrameError {
    /// Whether this error is a violation of the wire format.
    ///
    /// Violations are not recoverable mid-stream: the connection must be closed.
    pub fn is_violation(&self) -> bool {
        matches!(
            self,
            Self::InvalidLength { .. }
                | Self::PrefixMismatch
                | Self::SuffixNotFound { .. }
                | Self::BufferOverflow { .. }
                | Self::NoProgress { .. }
                | Self::LengthMismatch { .. }
                | Self::Desynchronized
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
