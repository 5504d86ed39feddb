//! Connection lifecycle for framed TCP links.
//!
//! [`LinkMachine`] is the sans-io lifecycle: connect, graceful and forced
//! shutdown, reconnect scheduling, and the rule that completions from an
//! earlier connection are never acted on. [`Link`] drives it on tokio,
//! feeding decoded messages and lifecycle notifications to a [`LinkHandler`].

pub mod error;
pub mod handler;
pub mod link;
pub mod machine;
pub mod policy;
pub mod state;
pub mod timer;

pub use error::{LinkError, Result};
pub use handler::{LinkContext, LinkHandler};
pub use link::{Link, LinkConfig, LinkHandle, LinkId};
pub use machine::{Action, CloseInfo, LinkMachine, Notification, ReadEnd};
pub use policy::{
    BackoffConfig, ReconnectContext, ReconnectDecision, ReconnectPolicy, DEFAULT_RECONNECT_DELAY,
};
pub use state::{CloseKind, LinkState};
pub use timer::{TimerId, TimerSet, TIMER_SLOTS};
