//! Remote browser run driver.
//!
//! Provides:
//! - `ClientSuite` - runs a suite in a remote browser and re-emits its events
//! - Client page options and URL building
//! - Heartbeat interval derivation
//! - `RunHandle` - cancellable, once-only run result

pub mod client_suite;
pub mod heartbeat;
pub mod options;
pub mod outcome;

pub use client_suite::ClientSuite;
pub use heartbeat::heartbeat_interval;
pub use options::{ClientOptions, DerivedOptions, client_url};
pub use outcome::{RunError, RunHandle, RunOutcome};
