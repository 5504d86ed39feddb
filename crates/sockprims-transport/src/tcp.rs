use std::net::{SocketAddr, TcpListener, TcpStream};
use std::time::Duration;

use tracing::{debug, info};

use crate::endpoint::Endpoint;
use crate::error::{Result, TransportError};

/// Blocking TCP listener.
///
/// Accepted streams have `TCP_NODELAY` set; framing already batches writes.
pub struct TcpAcceptor {
    listener: TcpListener,
    endpoint: Endpoint,
}

impl TcpAcceptor {
    /// Bind and listen on the given endpoint.
    ///
    /// Port 0 picks an ephemeral port; see [`TcpAcceptor::local_addr`].
    pub fn bind(endpoint: &Endpoint) -> Result<Self> {
        let addrs = endpoint.resolve()?;
        let listener = TcpListener::bind(&addrs[..]).map_err(|source| TransportError::Bind {
            endpoint: endpoint.clone(),
            source,
        })?;

        let bound = listener.local_addr()?;
        info!(%bound, "listening on tcp socket");

        Ok(Self {
            listener,
            endpoint: Endpoint::from(bound),
        })
    }

    /// Accept an incoming connection (blocking).
    pub fn accept(&self) -> Result<(TcpStream, SocketAddr)> {
        let (stream, peer) = self.listener.accept().map_err(TransportError::Accept)?;
        stream.set_nodelay(true)?;
        debug!(%peer, "accepted connection");
        Ok((stream, peer))
    }

    /// Address the listener is actually bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(Into::into)
    }

    /// The bound endpoint (with the ephemeral port filled in).
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Switch the listener between blocking and non-blocking accept.
    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        self.listener
            .set_nonblocking(nonblocking)
            .map_err(Into::into)
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        "tcp"
    }
}

/// Connect to an endpoint (blocking), trying each resolved address in turn.
pub fn connect(endpoint: &Endpoint, timeout: Option<Duration>) -> Result<TcpStream> {
    let mut last_err = None;
    for addr in endpoint.resolve()? {
        let attempt = match timeout {
            Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
            None => TcpStream::connect(addr),
        };
        match attempt {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                debug!(%endpoint, %addr, "connected");
                return Ok(stream);
            }
            Err(err) => last_err = Some(err),
        }
    }

    Err(TransportError::Connect {
        endpoint: endpoint.clone(),
        source: last_err.unwrap_or_else(|| std::io::ErrorKind::AddrNotAvailable.into()),
    })
}

/// Connect to an endpoint without blocking the runtime.
#[cfg(feature = "async")]
pub async fn connect_async(endpoint: &Endpoint) -> Result<tokio::net::TcpStream> {
    let stream = tokio::net::TcpStream::connect((endpoint.host(), endpoint.port()))
        .await
        .map_err(|source| TransportError::Connect {
            endpoint: endpoint.clone(),
            source,
        })?;
    stream.set_nodelay(true)?;
    debug!(%endpoint, "connected");
    Ok(stream)
}
