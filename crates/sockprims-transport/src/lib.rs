//! TCP transport primitives.
//!
//! This is the lowest layer of sockprims: endpoint parsing and resolution,
//! blocking connect/accept, and (behind the `async` feature) a tokio connect
//! used by the link driver. Nothing here knows about framing.

pub mod endpoint;
pub mod error;
pub mod tcp;

pub use endpoint::{Endpoint, DEFAULT_HOST, DEFAULT_PORT};
pub use error::{Result, TransportError};
#[cfg(feature = "async")]
pub use tcp::connect_async;
pub use tcp::{connect, TcpAcceptor};
