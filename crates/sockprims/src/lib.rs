//! Message framing and self-healing connection lifecycle for TCP sockets.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP endpoints, connect and accept
//! - [`frame`]: stream-to-message decoders, encoders, blocking and async
//!   message readers/writers
//! - [`link`]: connection lifecycle machine, reconnect policies, timers and
//!   the tokio driver (behind the `link` feature)

/// Re-export transport types.
pub mod transport {
    pub use sockprims_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use sockprims_frame::*;
}

/// Re-export link types (requires `link` feature).
#[cfg(feature = "link")]
pub mod link {
    pub use sockprims_link::*;
}
