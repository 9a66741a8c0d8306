//! Local stand-in for a suite that runs inside a remote browser.
//!
//! A `ClientSuite` points the remote browser at the client page, listens to
//! the events its session publishes through the relay, and re-emits them to
//! the local reporter. The remote root suite is folded into the local suite
//! so reporters see one tree.

use std::{
    path::PathBuf,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
};

use futures::{FutureExt, future};
use serde_json::{Map, Value};
use suite_relay_core::{
    ClientConfig, EventError, RemoteError, Remote, Reporter, Suite, SuiteEvent,
    event::{FATAL_ERROR, RUN_END, RUN_START, SUITE_END, SUITE_ERROR, SUITE_START},
    message::event_args,
};
use suite_relay_session::{EventRelay, Listener, ListenerError, ListenerFuture, Subscription};

use crate::{
    heartbeat::{heartbeat_interval, stop_heartbeat},
    options::{ClientOptions, DerivedOptions, client_url, initial_base_url, proxy_root, reporter_spec},
    outcome::{RunError, RunHandle, RunOutcome},
};

/// Page loaded in the remote browser once the run is over.
const BLANK_PAGE: &str = "about:blank";

/// Suite whose tests execute in a remote browser.
pub struct ClientSuite {
    config: ClientConfig,
    relay: Arc<EventRelay>,
    remote: Arc<dyn Remote>,
    reporter: Arc<dyn Reporter>,
    suite: Arc<Mutex<Suite>>,
    working_dir: PathBuf,
    args: Map<String, Value>,
}

impl ClientSuite {
    /// Create a suite named after `config.name`.
    #[must_use]
    pub fn new(
        config: ClientConfig,
        relay: Arc<EventRelay>,
        remote: Arc<dyn Remote>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        let mut suite = Suite::named(config.name.clone());
        suite.id = Some(config.name.clone());
        let args = config.args.clone();
        Self {
            config,
            relay,
            remote,
            reporter,
            suite: Arc::new(Mutex::new(suite)),
            working_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            args,
        }
    }

    /// Override the directory the initial base URL is derived from.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    /// Extend the run arguments passed to the client page.
    #[must_use]
    pub fn with_args(mut self, args: Map<String, Value>) -> Self {
        self.args.extend(args);
        self
    }

    /// Snapshot of the local suite.
    #[must_use]
    pub fn suite(&self) -> Suite {
        self.suite.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Options handed to the client page.
    ///
    /// # Errors
    /// Returns error if the proxy URL is invalid.
    pub fn client_options(&self) -> Result<ClientOptions, RunError> {
        let proxy = proxy_root(&self.config.proxy_url)?;
        let root_suite_name = {
            let suite = self.suite.lock().unwrap_or_else(PoisonError::into_inner);
            suite.id.clone().unwrap_or_else(|| suite.name.clone())
        };
        let derived = DerivedOptions {
            base_path: proxy.path().to_string(),
            initial_base_url: initial_base_url(proxy.path(), &self.config.base_path, &self.working_dir),
            reporters: reporter_spec(self.config.runner_client_reporter.as_ref()),
            root_suite_name,
            session_id: self.remote.session_id().to_string(),
        };
        Ok(ClientOptions::merge(&self.args, derived))
    }

    /// Start the remote run.
    ///
    /// The returned handle settles when the remote reports the end of the
    /// run or an unrecoverable error. Must be called within a Tokio runtime.
    pub fn run(&self) -> RunHandle {
        let session_id = self.remote.session_id().to_string();
        let slot = Arc::new(SubscriptionSlot::default());

        let (outcome, handle) = RunOutcome::new({
            let slot = Arc::clone(&slot);
            let remote = Arc::clone(&self.remote);
            move || {
                async move {
                    slot.remove();
                    stop_heartbeat(remote.as_ref()).await;
                }
                .boxed()
            }
        });

        let state = Arc::new(RunState {
            remote: Arc::clone(&self.remote),
            reporter: Arc::clone(&self.reporter),
            suite: Arc::clone(&self.suite),
            slot,
            outcome,
            terminal: AtomicBool::new(false),
        });

        let subscription = self.relay.subscribe(&session_id, RunListener(Arc::clone(&state)));
        state.slot.attach(subscription);
        tracing::info!(session_id = %session_id, suite = %self.config.name, "Starting remote run");

        let target = self
            .client_options()
            .and_then(|options| client_url(&self.config.proxy_url, &options).map_err(RunError::from));
        let heartbeat = heartbeat_interval(self.config.capabilities.idle_timeout);

        tokio::spawn(async move {
            let url = match target {
                Ok(url) => url,
                Err(e) => {
                    state.abort(e).await;
                    return;
                }
            };

            // A run settled before this task started must not touch the remote.
            if state.outcome.is_settled() {
                return;
            }
            if let Some(ms) = heartbeat {
                if let Err(e) = state.remote.set_heartbeat_interval(ms).await {
                    tracing::warn!(session_id = state.remote.session_id(), "Failed to start heartbeat: {e}");
                }
                // Cancelled while the interval was being set.
                if state.outcome.is_settled() {
                    stop_heartbeat(state.remote.as_ref()).await;
                    return;
                }
            }

            tracing::debug!(url = %url, "Loading client page");
            if let Err(e) = state.remote.get(url.as_str()).await {
                state.abort(e.into()).await;
            }
        });

        handle
    }
}

/// Subscription that may be removed before it is attached.
#[derive(Default)]
struct SubscriptionSlot {
    inner: Mutex<SlotState>,
}

#[derive(Default)]
struct SlotState {
    subscription: Option<Subscription>,
    removed: bool,
}

impl SubscriptionSlot {
    fn attach(&self, subscription: Subscription) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.removed {
            subscription.destroy();
        } else {
            inner.subscription = Some(subscription);
        }
    }

    fn remove(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.removed = true;
        if let Some(subscription) = inner.subscription.take() {
            subscription.destroy();
        }
    }
}

struct RunState {
    remote: Arc<dyn Remote>,
    reporter: Arc<dyn Reporter>,
    suite: Arc<Mutex<Suite>>,
    slot: Arc<SubscriptionSlot>,
    outcome: RunOutcome,
    terminal: AtomicBool,
}

impl RunState {
    fn snapshot(&self) -> Suite {
        self.suite.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    // At most one terminal report per run.
    fn claim_terminal(&self) -> bool {
        !self.terminal.swap(true, Ordering::SeqCst) && !self.outcome.is_settled()
    }

    // Lifecycle events are routed by name and root-ness before any payload
    // is interpreted. Everything else is forwarded exactly as received.
    fn receive(self: &Arc<Self>, name: &str, data: &Value) -> ListenerFuture {
        let args = event_args(data);
        let root = args.first().filter(|suite| is_root(suite)).cloned();
        match (name, root) {
            (RUN_START, _) => future::ok(()).boxed(),
            (RUN_END, _) => {
                self.slot.remove();
                self.finish()
            }
            (FATAL_ERROR, _) => {
                self.slot.remove();
                self.fail(RunError::Suite(RemoteError::from_value(args.first())))
            }
            (SUITE_ERROR, Some(suite)) => {
                let error = args
                    .get(1)
                    .filter(|e| !e.is_null())
                    .or_else(|| suite.get("error"));
                self.slot.remove();
                self.fail(RunError::Suite(RemoteError::from_value(error)))
            }
            (SUITE_START | SUITE_END, Some(suite)) => {
                match serde_json::from_value::<Suite>(suite) {
                    Ok(remote) if name == SUITE_START => self.reconcile_start(remote),
                    Ok(remote) => self.reconcile_end(remote),
                    Err(source) => {
                        let e = EventError::Payload {
                            event: name.to_string(),
                            source,
                        };
                        future::err(e.into()).boxed()
                    }
                }
            }
            _ => self.forward(SuiteEvent::verbatim(name, args)),
        }
    }

    fn reconcile_start(&self, remote: Suite) -> ListenerFuture {
        let local = {
            let mut suite = self.suite.lock().unwrap_or_else(PoisonError::into_inner);
            suite.tests = remote.tests;
            suite.clone()
        };
        self.forward(SuiteEvent::SuiteStart(local))
    }

    fn reconcile_end(&self, remote: Suite) -> ListenerFuture {
        let mut suite = self.suite.lock().unwrap_or_else(PoisonError::into_inner);
        suite.skipped = remote.skipped;
        for (index, child) in remote.tests.into_iter().enumerate() {
            match suite.tests.get_mut(index) {
                Some(slot) => *slot = child,
                None => suite.tests.push(child),
            }
        }
        future::ok(()).boxed()
    }

    fn forward(&self, event: SuiteEvent) -> ListenerFuture {
        let reporter = Arc::clone(&self.reporter);
        async move { reporter.emit(&event).await.map_err(Into::into) }.boxed()
    }

    fn finish(self: &Arc<Self>) -> ListenerFuture {
        if !self.claim_terminal() {
            return future::ok(()).boxed();
        }
        let state = Arc::clone(self);
        async move {
            stop_heartbeat(state.remote.as_ref()).await;
            if let Err(e) = state.remote.get(BLANK_PAGE).await {
                tracing::warn!(session_id = state.remote.session_id(), "Failed to unload client page: {e}");
            }

            match state.reporter.emit(&SuiteEvent::SuiteEnd(state.snapshot())).await {
                Ok(()) => {
                    state.outcome.resolve();
                    Ok(())
                }
                Err(e) => {
                    let message = e.to_string();
                    state.report_failure(RunError::Report(e)).await;
                    Err(ListenerError::Failed(message))
                }
            }
        }
        .boxed()
    }

    fn fail(self: &Arc<Self>, error: RunError) -> ListenerFuture {
        if !self.claim_terminal() {
            return future::ok(()).boxed();
        }
        let state = Arc::clone(self);
        async move {
            state.report_failure(error).await;
            Ok(())
        }
        .boxed()
    }

    // Record the error on the local suite, report it, then settle.
    async fn report_failure(&self, error: RunError) {
        let remote_error = error.to_remote_error();
        let local = {
            let mut suite = self.suite.lock().unwrap_or_else(PoisonError::into_inner);
            suite.error = Some(remote_error.clone());
            suite.clone()
        };
        tracing::error!(session_id = self.remote.session_id(), "Remote run failed: {error}");

        let event = SuiteEvent::SuiteError {
            suite: local,
            error: remote_error,
        };
        if let Err(e) = self.reporter.emit(&event).await {
            tracing::error!("Failed to report suite error: {e}");
        }
        self.outcome.reject(error);
    }

    // Navigation never got the client running.
    async fn abort(&self, error: RunError) {
        self.slot.remove();
        stop_heartbeat(self.remote.as_ref()).await;
        if self.claim_terminal() {
            self.report_failure(error).await;
        }
    }
}

struct RunListener(Arc<RunState>);

impl Listener for RunListener {
    fn call(&self, name: &str, data: &Value) -> ListenerFuture {
        self.0.receive(name, data)
    }
}

// Root suites are objects whose `hasParent` is false, null or missing.
fn is_root(suite: &Value) -> bool {
    suite.is_object()
        && match suite.get("hasParent") {
            None | Some(Value::Null) => true,
            Some(Value::Bool(has_parent)) => !has_parent,
            Some(_) => false,
        }
}
