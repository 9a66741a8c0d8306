//! Session coordination for remote test runs.
//!
//! Provides:
//! - `SessionRegistry` - Per-session listener lists
//! - `EventRelay` - Message fan-out with policy-driven acknowledgement

pub mod registry;
pub mod relay;

pub use registry::{Listener, ListenerError, ListenerFuture, SessionRegistry, Subscription, listener_fn};
pub use relay::{Dispatch, EventRelay, RelayError};
