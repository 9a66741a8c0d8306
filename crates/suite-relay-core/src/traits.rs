//! Collaborator traits: reporting sink, process error channel, remote driver.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::SuiteEvent;

/// Boxed error accepted by the process-wide error channel.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Reporter error.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Reporter failed: {0}")]
    Failed(String),
    #[error("Reporter closed")]
    Closed,
}

/// Reporting sink that receives lifecycle events.
#[async_trait]
pub trait Reporter: Send + Sync {
    /// Emit one event to every attached reporter.
    async fn emit(&self, event: &SuiteEvent) -> Result<(), ReportError>;
}

/// Process-wide error channel.
///
/// Errors reported here are never thrown back to the caller that raised
/// them.
pub trait ErrorSink: Send + Sync {
    fn report(&self, error: BoxError);
}

/// Error sink that only logs.
#[derive(Debug, Default, Clone)]
pub struct LogErrors;

impl ErrorSink for LogErrors {
    fn report(&self, error: BoxError) {
        tracing::error!(error = %error, "relay error");
    }
}

/// Error sink that logs and forwards errors to a receiver.
#[derive(Debug, Clone)]
pub struct ErrorChannel {
    tx: mpsc::UnboundedSender<BoxError>,
}

impl ErrorChannel {
    /// Create a channel and its receiving end.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<BoxError>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ErrorSink for ErrorChannel {
    fn report(&self, error: BoxError) {
        tracing::error!(error = %error, "relay error");
        // Nobody listening is fine; the error has been logged.
        let _ = self.tx.send(error);
    }
}

/// Remote driver error.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },
    #[error("Failed to set heartbeat interval: {0}")]
    Heartbeat(String),
    #[error("Remote session closed")]
    SessionClosed,
}

/// Command channel to a remote browser session.
#[async_trait]
pub trait Remote: Send + Sync {
    /// Session identifier assigned by the driver layer.
    fn session_id(&self) -> &str;

    /// Navigate the remote browser.
    async fn get(&self, url: &str) -> Result<(), DriverError>;

    /// Send a no-op every `ms` milliseconds; `0` disables the heartbeat.
    async fn set_heartbeat_interval(&self, ms: u64) -> Result<(), DriverError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_error_channel_forwards() {
        let (sink, mut rx) = ErrorChannel::new();
        sink.report("listener exploded".into());
        let err = rx.recv().await.unwrap();
        assert_eq!(err.to_string(), "listener exploded");
    }

    #[test]
    fn test_error_channel_without_receiver() {
        let (sink, rx) = ErrorChannel::new();
        drop(rx);
        sink.report(Box::new(DriverError::SessionClosed));
    }
}
