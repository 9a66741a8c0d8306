//! Event relay: fans session messages out to listeners and decides
//! whether acknowledgement waits for them.

use std::sync::Arc;

use futures::{
    FutureExt, StreamExt,
    future::{self, BoxFuture},
    stream::FuturesUnordered,
};
use suite_relay_core::{ErrorSink, LogErrors, Message, MessageId, SyncPolicy, event::RUN_END};

use crate::registry::{Listener, ListenerError, SessionRegistry, Subscription};

/// Relay error.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Listener for session {session_id} failed on {event} [{message_id}]: {source}")]
    Listener {
        session_id: String,
        message_id: MessageId,
        event: String,
        #[source]
        source: ListenerError,
    },
}

/// Future resolved once a message has been relayed as far as the
/// synchronization policy requires.
pub type Dispatch = BoxFuture<'static, Result<(), RelayError>>;

/// Multiplexes per-session messages onto registered listeners.
pub struct EventRelay {
    registry: SessionRegistry,
    policy: SyncPolicy,
    errors: Arc<dyn ErrorSink>,
}

impl EventRelay {
    /// Create a relay that logs unobserved listener failures.
    #[must_use]
    pub fn new(policy: SyncPolicy) -> Self {
        Self::with_error_sink(policy, Arc::new(LogErrors))
    }

    /// Create a relay reporting unobserved failures to `errors`.
    #[must_use]
    pub fn with_error_sink(policy: SyncPolicy, errors: Arc<dyn ErrorSink>) -> Self {
        Self {
            registry: SessionRegistry::new(),
            policy,
            errors,
        }
    }

    /// Listen for all events of one session.
    pub fn subscribe<L>(&self, session_id: &str, listener: L) -> Subscription
    where
        L: Listener + 'static,
    {
        self.registry.subscribe(session_id, Arc::new(listener))
    }

    /// Invoke every listener of the message's session.
    ///
    /// Listeners are called immediately and run concurrently. The returned
    /// future settles once all of them have settled and fails with the
    /// first failure observed. Successful side effects of other listeners
    /// are kept.
    pub fn publish(&self, message: &Message) -> Dispatch {
        let listeners = self.registry.listeners(&message.session_id);
        let mut pending: FuturesUnordered<_> = listeners
            .iter()
            .map(|listener| listener.call(&message.name, &message.data))
            .collect();

        let registry = self.registry.clone();
        let session_id = message.session_id.clone();
        let message_id = message.id.clone();
        let event = message.name.clone();

        async move {
            let mut first_error = None;
            while let Some(result) = pending.next().await {
                if let Err(source) = result {
                    first_error.get_or_insert(source);
                }
            }

            if event == RUN_END {
                registry.evict_if_idle(&session_id);
            }

            match first_error {
                Some(source) => Err(RelayError::Listener {
                    session_id,
                    message_id,
                    event,
                    source,
                }),
                None => Ok(()),
            }
        }
        .boxed()
    }

    /// Relay one inbound message.
    ///
    /// When the policy says to wait, the returned future is the publish
    /// future. Otherwise publishing continues in the background, failures
    /// go to the error sink, and the returned future is already complete.
    pub fn handle_message(&self, message: &Message) -> Dispatch {
        tracing::debug!(
            session_id = %message.session_id,
            message_id = %message.id,
            event = %message.name,
            "Processing message"
        );

        let publishing = self.publish(message);
        if self.policy.should_wait(message) {
            return publishing;
        }

        let errors = Arc::clone(&self.errors);
        tokio::spawn(async move {
            if let Err(e) = publishing.await {
                errors.report(Box::new(e));
            }
        });

        future::ok(()).boxed()
    }

    /// Synchronization policy in effect.
    #[must_use]
    pub const fn policy(&self) -> &SyncPolicy {
        &self.policy
    }

    /// Underlying session registry.
    #[must_use]
    pub const fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Error sink for failures nobody awaits.
    #[must_use]
    pub fn error_sink(&self) -> Arc<dyn ErrorSink> {
        Arc::clone(&self.errors)
    }
}
