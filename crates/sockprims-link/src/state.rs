use std::fmt;

/// Lifecycle state of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LinkState {
    /// Never connected, or reset.
    #[default]
    Idle,
    Connecting,
    Connected,
    /// Write side shut down; waiting for the peer to close.
    GracefulClosing,
    /// Transport being torn down without flushing.
    ForceClosing,
    Closed,
}

impl LinkState {
    /// Whether the link is at rest (`Idle` or `Closed`).
    pub fn is_at_rest(self) -> bool {
        matches!(self, Self::Idle | Self::Closed)
    }

    /// Whether a shutdown is under way.
    pub fn is_closing(self) -> bool {
        matches!(self, Self::GracefulClosing | Self::ForceClosing)
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::GracefulClosing => "graceful-closing",
            Self::ForceClosing => "force-closing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Why a link reached `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseKind {
    /// `force_shutdown`/`disconnect`, or a graceful request that had to be forced.
    Requested,
    /// Graceful shutdown completed: the peer closed after our write side did.
    Graceful,
    /// The connection failed or the peer went away unexpectedly.
    Broken,
    /// The peer broke the framing protocol.
    Violation,
    /// A connect attempt failed.
    ConnectFailed,
    /// The reconnect policy gave up.
    ReconnectExhausted,
}

impl fmt::Display for CloseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Requested => "requested",
            Self::Graceful => "graceful",
            Self::Broken => "broken",
            Self::Violation => "violation",
            Self::ConnectFailed => "connect-failed",
            Self::ReconnectExhausted => "reconnect-exhausted",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names() {
        assert_eq!(LinkState::GracefulClosing.to_string(), "graceful-closing");
        assert_eq!(CloseKind::ConnectFailed.to_string(), "connect-failed");
    }

    #[test]
    fn rest_and_closing() {
        assert!(LinkState::Idle.is_at_rest());
        assert!(LinkState::Closed.is_at_rest());
        assert!(!LinkState::Connected.is_at_rest());
        assert!(LinkState::ForceClosing.is_closing());
        assert!(!LinkState::Connecting.is_closing());
    }
}
