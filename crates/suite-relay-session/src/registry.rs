//! Per-session listener registry.

use std::{
    collections::HashMap,
    sync::{
        Arc, PoisonError, RwLock, Weak,
        atomic::{AtomicBool, Ordering},
    },
};

use futures::future::BoxFuture;
use serde_json::Value;
use suite_relay_core::{EventError, ReportError};
use uuid::Uuid;

/// Listener error.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error(transparent)]
    Event(#[from] EventError),
    #[error(transparent)]
    Report(#[from] ReportError),
    #[error("{0}")]
    Failed(String),
}

/// Future returned by a listener invocation.
pub type ListenerFuture = BoxFuture<'static, Result<(), ListenerError>>;

/// Callback invoked for every message of one session.
///
/// Work done before the returned future is produced runs at invocation
/// time, in the order messages were received.
pub trait Listener: Send + Sync {
    fn call(&self, name: &str, data: &Value) -> ListenerFuture;
}

impl<F> Listener for F
where
    F: Fn(&str, &Value) -> ListenerFuture + Send + Sync,
{
    fn call(&self, name: &str, data: &Value) -> ListenerFuture {
        self(name, data)
    }
}

/// Pin a closure to the listener signature.
pub fn listener_fn<F>(f: F) -> F
where
    F: Fn(&str, &Value) -> ListenerFuture + Send + Sync,
{
    f
}

type Sessions = RwLock<HashMap<String, SessionRecord>>;

#[derive(Default)]
struct SessionRecord {
    listeners: Vec<(Uuid, Arc<dyn Listener>)>,
}

/// Listener lists keyed by session id.
///
/// Records are created on first reference.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<Sessions>,
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for `session_id`.
    pub fn subscribe(&self, session_id: &str, listener: Arc<dyn Listener>) -> Subscription {
        let id = Uuid::new_v4();
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(session_id.to_string())
            .or_default()
            .listeners
            .push((id, listener));

        tracing::debug!(session_id, listener_id = %id, "Listener subscribed");

        Subscription {
            inner: Arc::new(SubscriptionInner {
                sessions: Arc::downgrade(&self.sessions),
                session_id: session_id.to_string(),
                listener_id: id,
                destroyed: AtomicBool::new(false),
            }),
        }
    }

    /// Snapshot of the listeners currently registered for `session_id`.
    #[must_use]
    pub fn listeners(&self, session_id: &str) -> Vec<Arc<dyn Listener>> {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(session_id.to_string())
            .or_default()
            .listeners
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect()
    }

    /// Drop a session record and all its listeners.
    pub fn evict(&self, session_id: &str) -> bool {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id)
            .is_some()
    }

    /// Drop a session record if it has no listeners left.
    pub fn evict_if_idle(&self, session_id: &str) -> bool {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let idle = sessions
            .get(session_id)
            .is_some_and(|s| s.listeners.is_empty());
        if idle {
            sessions.remove(session_id);
            tracing::debug!(session_id, "Evicted idle session");
        }
        idle
    }

    /// Number of session records.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Number of listeners registered for `session_id`.
    #[must_use]
    pub fn listener_count(&self, session_id: &str) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .map_or(0, |s| s.listeners.len())
    }
}

struct SubscriptionInner {
    sessions: Weak<Sessions>,
    session_id: String,
    listener_id: Uuid,
    destroyed: AtomicBool,
}

/// Removable registration of one listener.
///
/// Clones share state: destroying any clone destroys the subscription.
#[derive(Clone)]
pub struct Subscription {
    inner: Arc<SubscriptionInner>,
}

impl Subscription {
    /// Stop delivery to this listener. Calling it again is a no-op.
    ///
    /// Invocations already dispatched are not cancelled.
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        let Some(sessions) = self.inner.sessions.upgrade() else {
            return;
        };
        let mut guard = sessions.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(record) = guard.get_mut(&self.inner.session_id) {
            record
                .listeners
                .retain(|(id, _)| *id != self.inner.listener_id);
        }
        tracing::debug!(
            session_id = %self.inner.session_id,
            listener_id = %self.inner.listener_id,
            "Listener removed"
        );
    }

    /// Whether `destroy` has been called.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::Acquire)
    }

    /// Session this subscription belongs to.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("session_id", &self.inner.session_id)
            .field("listener_id", &self.inner.listener_id)
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    fn noop() -> Arc<dyn Listener> {
        Arc::new(listener_fn(|_: &str, _: &Value| futures::future::ok(()).boxed()))
    }

    #[test]
    fn test_records_created_lazily() {
        let registry = SessionRegistry::new();
        assert_eq!(registry.session_count(), 0);
        assert!(registry.listeners("S1").is_empty());
        assert_eq!(registry.session_count(), 1);
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let registry = SessionRegistry::new();
        let first = registry.subscribe("S1", noop());
        let _second = registry.subscribe("S1", noop());
        assert_eq!(registry.listener_count("S1"), 2);

        first.destroy();
        first.destroy();
        first.clone().destroy();

        assert!(first.is_destroyed());
        assert_eq!(registry.listener_count("S1"), 1);
    }

    #[test]
    fn test_destroy_after_registry_dropped() {
        let registry = SessionRegistry::new();
        let sub = registry.subscribe("S1", noop());
        drop(registry);
        sub.destroy();
        assert!(sub.is_destroyed());
    }

    #[test]
    fn test_evict_if_idle() {
        let registry = SessionRegistry::new();
        let sub = registry.subscribe("S1", noop());
        assert!(!registry.evict_if_idle("S1"));

        sub.destroy();
        assert!(registry.evict_if_idle("S1"));
        assert_eq!(registry.session_count(), 0);
        assert!(!registry.evict("S1"));
    }
}
