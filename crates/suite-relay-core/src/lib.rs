//! Core types for relaying remote test-run events.
//!
//! This crate provides the shared building blocks:
//! - `Message` - Wire message sent by remote clients
//! - `SuiteEvent` - Typed lifecycle events
//! - `Suite` / `Test` - Reported suite tree
//! - `SyncPolicy` - Acknowledgement synchronization policy
//! - `ReportStore` - Broadcast + history reporting sink
//! - Reporter, error channel and remote driver traits

pub mod config;
pub mod event;
pub mod message;
pub mod policy;
pub mod report_store;
pub mod suite;
pub mod traits;

pub use config::{Capabilities, ClientConfig, ConfigError, RelayConfig, ServerConfig};
pub use event::{EventError, SuiteEvent};
pub use message::{Ack, Message, MessageId};
pub use policy::SyncPolicy;
pub use report_store::ReportStore;
pub use suite::{RemoteError, Suite, SuiteChild, Test};
pub use traits::{
    BoxError, DriverError, ErrorChannel, ErrorSink, LogErrors, Remote, ReportError, Reporter,
};
