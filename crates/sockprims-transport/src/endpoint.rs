use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};
use std::str::FromStr;

use crate::error::{Result, TransportError};

/// Default host used when none is configured.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default port used when none is configured.
pub const DEFAULT_PORT: u16 = 5050;

/// A target `(host, port)` pair.
///
/// The host is kept as given (name or literal address) and only resolved when
/// a connection attempt is made, so that every reconnect re-resolves it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    /// Create an endpoint from a host and port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Host name or literal address.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// TCP port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Resolve to every socket address the host maps to.
    pub fn resolve(&self) -> Result<Vec<SocketAddr>> {
        let addrs: Vec<SocketAddr> = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|source| TransportError::Resolve {
                endpoint: self.to_string(),
                source,
            })?
            .collect();

        if addrs.is_empty() {
            return Err(TransportError::Resolve {
                endpoint: self.to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::AddrNotAvailable,
                    "host resolved to no addresses",
                ),
            });
        }
        Ok(addrs)
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT)
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for Endpoint {
    type Err = TransportError;

    /// Parse `host:port`, `[v6-literal]:port`, or a bare `:port` (default host).
    fn from_str(input: &str) -> Result<Self> {
        let invalid = |msg: &str| TransportError::Resolve {
            endpoint: input.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, msg.to_string()),
        };

        let (host, port) = input
            .rsplit_once(':')
            .ok_or_else(|| invalid("expected <host>:<port>"))?;
        let port: u16 = port.parse().map_err(|_| invalid("invalid port"))?;

        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        let host = if host.is_empty() { DEFAULT_HOST } else { host };

        Ok(Self::new(host, port))
    }
}
