//! Coordination server for remote test clients.
//!
//! Run with: cargo run -p relay-server -- <session-id>...
//!
//! Events published by the listed sessions are recorded and streamed at
//! `GET /events` on the HTTP port.

use std::{env, sync::Arc};

use anyhow::Context;
use axum::{
    Router,
    extract::State,
    response::sse::{KeepAlive, Sse},
    routing::get,
};
use futures::{FutureExt, future};
use serde_json::Value;
use suite_relay_core::{LogErrors, RelayConfig, ReportStore, SuiteEvent, message::event_args};
use suite_relay_session::{EventRelay, ListenerFuture, Subscription, listener_fn};
use suite_relay_transport::RelayServer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = load_config()?;
    let store = Arc::new(ReportStore::new());

    let events = Router::new()
        .route("/events", get(events_handler))
        .with_state(Arc::clone(&store));
    let mut server = RelayServer::from_config(config.server, Arc::new(LogErrors)).with_routes(events);

    let _watched: Vec<Subscription> = env::args()
        .skip(1)
        .map(|session_id| watch(server.relay(), &store, &session_id))
        .collect();

    server.start().await?;
    if let Some(addr) = server.http_addr() {
        tracing::info!("Event stream at http://{addr}/events");
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    server.stop().await?;
    Ok(())
}

fn load_config() -> anyhow::Result<RelayConfig> {
    let mut config = match env::var("SUITE_RELAY_CONFIG") {
        Ok(path) => RelayConfig::from_path(&path)
            .with_context(|| format!("failed to load config from {path}"))?,
        Err(_) => RelayConfig::default(),
    };

    if let Ok(port) = env::var("SUITE_RELAY_PORT") {
        config.server.port = port.parse().context("invalid SUITE_RELAY_PORT")?;
    }
    if let Ok(port) = env::var("SUITE_RELAY_SOCKET_PORT") {
        config.server.socket_port = port.parse().context("invalid SUITE_RELAY_SOCKET_PORT")?;
    }
    Ok(config)
}

// Record every event of one session in the store.
fn watch(relay: &EventRelay, store: &Arc<ReportStore>, session_id: &str) -> Subscription {
    tracing::info!(session_id, "Watching session");
    let store = Arc::clone(store);
    relay.subscribe(
        session_id,
        listener_fn(move |name: &str, data: &Value| -> ListenerFuture {
            store.push(SuiteEvent::verbatim(name, event_args(data)));
            future::ok(()).boxed()
        }),
    )
}

async fn events_handler(
    State(store): State<Arc<ReportStore>>,
) -> Sse<
    axum::response::sse::KeepAliveStream<
        futures::stream::BoxStream<'static, Result<axum::response::sse::Event, std::io::Error>>,
    >,
> {
    Sse::new(store.sse_stream()).keep_alive(KeepAlive::default())
}
