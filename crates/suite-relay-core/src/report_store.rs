//! Broadcast + history store for emitted reports.

use std::{
    collections::VecDeque,
    sync::{PoisonError, RwLock},
};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::{ReportError, Reporter, SuiteEvent};

/// Number of events kept for late subscribers.
const HISTORY_LIMIT: usize = 10_000;

/// Reporting sink that keeps a bounded history and fans events out live.
///
/// Late subscribers receive history first and then live updates.
pub struct ReportStore {
    history: RwLock<VecDeque<SuiteEvent>>,
    sender: broadcast::Sender<SuiteEvent>,
}

impl Default for ReportStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportStore {
    /// Create a new report store.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1024);
        Self {
            history: RwLock::new(VecDeque::with_capacity(32)),
            sender,
        }
    }

    /// Record an event and notify live subscribers.
    pub fn push(&self, event: SuiteEvent) {
        let _ = self.sender.send(event.clone()); // live subscribers

        let mut history = self.history.write().unwrap_or_else(PoisonError::into_inner);
        if history.len() == HISTORY_LIMIT {
            history.pop_front();
        }
        history.push_back(event);
    }

    /// Get a receiver for live updates.
    #[must_use]
    pub fn receiver(&self) -> broadcast::Receiver<SuiteEvent> {
        self.sender.subscribe()
    }

    /// Snapshot of recorded events.
    #[must_use]
    pub fn history(&self) -> Vec<SuiteEvent> {
        self.history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Names of recorded events, in emission order.
    #[must_use]
    pub fn event_names(&self) -> Vec<String> {
        self.history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|e| e.name().to_string())
            .collect()
    }

    /// Stream that yields history first, then live updates.
    #[must_use]
    pub fn history_plus_stream(&self) -> futures::stream::BoxStream<'static, SuiteEvent> {
        let (history, rx) = (self.history(), self.receiver());

        let hist = futures::stream::iter(history);
        let live = BroadcastStream::new(rx).filter_map(|res| async move { res.ok() });

        Box::pin(hist.chain(live))
    }

    /// SSE stream (requires `sse` feature).
    #[cfg(feature = "sse")]
    #[must_use]
    pub fn sse_stream(
        &self,
    ) -> futures::stream::BoxStream<'static, Result<axum::response::sse::Event, std::io::Error>>
    {
        self.history_plus_stream()
            .map(|event| {
                let data = serde_json::Value::Array(event.args()).to_string();
                Ok(axum::response::sse::Event::default()
                    .event(event.name())
                    .data(data))
            })
            .boxed()
    }
}

#[async_trait]
impl Reporter for ReportStore {
    async fn emit(&self, event: &SuiteEvent) -> Result<(), ReportError> {
        self.push(event.clone());
        Ok(())
    }
}
