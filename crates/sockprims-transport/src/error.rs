use crate::endpoint::Endpoint;

/// Errors that can occur in socket transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The endpoint could not be parsed or resolved to a socket address.
    #[error("failed to resolve {endpoint}: {source}")]
    Resolve {
        endpoint: String,
        source: std::io::Error,
    },

    /// Failed to connect to the specified endpoint.
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: Endpoint,
        source: std::io::Error,
    },

    /// Failed to bind to the specified endpoint.
    #[error("failed to bind to {endpoint}: {source}")]
    Bind {
        endpoint: Endpoint,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The transport has been shut down.
    #[error("transport shut down")]
    Shutdown,
}

impl TransportError {
    /// The underlying I/O error, if this error wraps one.
    pub fn io_source(&self) -> Option<&std::io::Error> {
        match self {
            Self::Resolve { source, .. }
            | Self::Connect { source, .. }
            | Self::Bind { source, .. }
            | Self::Accept(source)
            | Self::Io(source) => Some(source),
            Self::Shutdown => None,
        }
    }

    /// Convert into a plain `std::io::Error`, keeping the original kind where one exists.
    pub fn into_io(self) -> std::io::Error {
        match self {
            Self::Resolve { source, .. }
            | Self::Connect { source, .. }
            | Self::Bind { source, .. }
            | Self::Accept(source)
            | Self::Io(source) => source,
            Self::Shutdown => std::io::Error::new(std::io::ErrorKind::NotConnected, "shut down"),
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
