use crate::state::LinkState;

/// Errors that can occur in link operations.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] sockprims_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] sockprims_frame::FrameError),

    /// The operation is not allowed in the current state.
    #[error("cannot {op} while {state}")]
    InvalidState { op: &'static str, state: LinkState },

    /// An operation of the same kind is still pending.
    #[error("{0} already in progress")]
    OperationInFlight(&'static str),

    /// The link is closing and accepts no new work.
    #[error("link is shutting down")]
    ShuttingDown,

    /// The reconnect policy gave up.
    #[error("reconnect attempts exhausted")]
    ReconnectExhausted,

    /// The link driver task has exited.
    #[error("link driver stopped")]
    Stopped,
}

pub type Result<T> = std::result::Result<T, LinkError>;
