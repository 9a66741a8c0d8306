//! Once-only completion of a remote run.

use std::{
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex, PoisonError},
    task::{Context, Poll},
};

use futures::future::BoxFuture;
use suite_relay_core::{DriverError, RemoteError, ReportError};
use thiserror::Error;
use tokio::sync::oneshot;

/// Why a remote run did not complete.
#[derive(Debug, Error)]
pub enum RunError {
    /// The remote suite reported a fatal or root-level error.
    #[error("Remote suite failed: {0}")]
    Suite(RemoteError),
    #[error(transparent)]
    Navigation(#[from] DriverError),
    #[error(transparent)]
    Report(#[from] ReportError),
    #[error("Invalid proxy URL: {0}")]
    ProxyUrl(#[from] url::ParseError),
    #[error("Run cancelled")]
    Cancelled,
}

impl RunError {
    /// Error payload recorded on the local suite.
    #[must_use]
    pub fn to_remote_error(&self) -> RemoteError {
        match self {
            Self::Suite(e) => e.clone(),
            Self::Navigation(_) => RemoteError::named("NavigationError", self.to_string()),
            Self::Report(_) => RemoteError::named("ReportError", self.to_string()),
            Self::ProxyUrl(_) => RemoteError::named("ConfigError", self.to_string()),
            Self::Cancelled => RemoteError::named("CancelError", self.to_string()),
        }
    }
}

type CancelHook = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

struct Gate {
    tx: Option<oneshot::Sender<Result<(), RunError>>>,
    on_cancel: Option<CancelHook>,
}

/// Settling side of a run.
///
/// The first of resolve, reject or cancel wins; later attempts are ignored.
#[derive(Clone)]
pub struct RunOutcome {
    gate: Arc<Mutex<Gate>>,
}

impl RunOutcome {
    /// Create an outcome and the handle that awaits it.
    ///
    /// `on_cancel` runs exactly once, before a cancelled run settles.
    pub fn new<F>(on_cancel: F) -> (Self, RunHandle)
    where
        F: FnOnce() -> BoxFuture<'static, ()> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let outcome = Self {
            gate: Arc::new(Mutex::new(Gate {
                tx: Some(tx),
                on_cancel: Some(Box::new(on_cancel)),
            })),
        };
        let handle = RunHandle {
            rx,
            outcome: outcome.clone(),
        };
        (outcome, handle)
    }

    /// Settle successfully. Returns false if already settled.
    pub fn resolve(&self) -> bool {
        self.settle(Ok(()))
    }

    /// Settle with an error. Returns false if already settled.
    pub fn reject(&self, error: RunError) -> bool {
        self.settle(Err(error))
    }

    fn settle(&self, result: Result<(), RunError>) -> bool {
        let tx = {
            let mut gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
            gate.on_cancel = None;
            gate.tx.take()
        };
        match tx {
            Some(tx) => {
                // The handle may have been dropped; the run is settled either way.
                let _ = tx.send(result);
                true
            }
            None => false,
        }
    }

    /// Cancel the run. Returns false if already settled.
    pub async fn cancel(&self) -> bool {
        let (tx, hook) = {
            let mut gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
            match gate.tx.take() {
                Some(tx) => (tx, gate.on_cancel.take()),
                None => return false,
            }
        };
        if let Some(hook) = hook {
            hook().await;
        }
        let _ = tx.send(Err(RunError::Cancelled));
        true
    }

    /// Whether the run has settled or is being cancelled.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .tx
            .is_none()
    }
}

/// Awaitable result of a remote run.
pub struct RunHandle {
    rx: oneshot::Receiver<Result<(), RunError>>,
    outcome: RunOutcome,
}

impl RunHandle {
    /// Cancel the run. Returns false if already settled.
    pub async fn cancel(&self) -> bool {
        self.outcome.cancel().await
    }

    /// Settling side, for cancelling from elsewhere while awaiting.
    #[must_use]
    pub fn outcome(&self) -> RunOutcome {
        self.outcome.clone()
    }
}

impl Future for RunHandle {
    type Output = Result<(), RunError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(RunError::Cancelled)))
    }
}
