use std::fmt;
use std::io;

use sockprims_frame::FrameError;
use sockprims_link::LinkError;
use sockprims_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(USAGE, message)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof => FAILURE,
        io::ErrorKind::AddrInUse | io::ErrorKind::AddrNotAvailable => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Resolve { .. } => CliError::new(USAGE, format!("{context}: {err}")),
        TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Accept(source)
        | TransportError::Io(source) => io_error(context, source),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::InvalidConfig(_) => CliError::new(USAGE, format!("{context}: {err}")),
        FrameError::ConnectionClosed | FrameError::EndOfStream => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        FrameError::MessageTooLarge { .. }
        | FrameError::SuffixInBody
        | FrameError::LengthMismatch { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        other if other.is_violation() => {
            CliError::new(DATA_INVALID, format!("{context}: {other}"))
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

pub fn link_error(context: &str, err: LinkError) -> CliError {
    match err {
        LinkError::Transport(err) => transport_error(context, err),
        LinkError::Frame(err) => frame_error(context, err),
        LinkError::ReconnectExhausted
        | LinkError::InvalidState { .. }
        | LinkError::OperationInFlight(_)
        | LinkError::ShuttingDown => CliError::new(FAILURE, format!("{context}: {err}")),
        LinkError::Stopped => CliError::new(INTERNAL, format!("{context}: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_map_to_124() {
        let err = io_error("read", io::ErrorKind::WouldBlock.into());
        assert_eq!(err.code, TIMEOUT);
        let err = frame_error("read", FrameError::Io(io::ErrorKind::TimedOut.into()));
        assert_eq!(err.code, TIMEOUT);
    }

    #[test]
    fn violations_are_invalid_data() {
        let err = frame_error("read", FrameError::PrefixMismatch);
        assert_eq!(err.code, DATA_INVALID);
        let err = frame_error("send", FrameError::MessageTooLarge { size: 10, max: 4 });
        assert_eq!(err.code, DATA_INVALID);
    }

    #[test]
    fn bad_framing_options_are_usage_errors() {
        let err = link_error(
            "spawn",
            LinkError::Frame(FrameError::InvalidConfig("suffix must not be empty".into())),
        );
        assert_eq!(err.code, USAGE);
        assert!(err.message.starts_with("spawn: "));
    }

    #[test]
    fn refused_connect_is_failure() {
        let err = transport_error(
            "connect",
            TransportError::Connect {
                endpoint: "127.0.0.1:1".parse().unwrap(),
                source: io::ErrorKind::ConnectionRefused.into(),
            },
        );
        assert_eq!(err.code, FAILURE);
    }
}
