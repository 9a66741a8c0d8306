//! Coordination server: binds the HTTP and WebSocket listeners.

use std::{io, net::SocketAddr, sync::Arc};

use axum::Router;
use suite_relay_core::{ErrorSink, ServerConfig};
use suite_relay_session::EventRelay;
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{http::create_http_router, websocket::create_ws_router};

/// Server error.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("Server error: {0}")]
    Serve(#[from] io::Error),
    #[error("Server task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("Server already started")]
    AlreadyStarted,
}

struct Listening {
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<io::Result<()>>,
}

/// HTTP + WebSocket front end for an [`EventRelay`].
pub struct RelayServer {
    config: ServerConfig,
    relay: Arc<EventRelay>,
    extra: Router,
    http: Option<Listening>,
    socket: Option<Listening>,
}

impl RelayServer {
    /// Create a stopped server.
    #[must_use]
    pub fn new(config: ServerConfig, relay: Arc<EventRelay>) -> Self {
        Self {
            config,
            relay,
            extra: Router::new(),
            http: None,
            socket: None,
        }
    }

    /// Create a stopped server with a relay using the configured policy.
    #[must_use]
    pub fn from_config(config: ServerConfig, errors: Arc<dyn ErrorSink>) -> Self {
        let relay = EventRelay::with_error_sink(config.run_in_sync.clone(), errors);
        Self::new(config, Arc::new(relay))
    }

    /// Serve additional routes on the HTTP listener.
    #[must_use]
    pub fn with_routes(mut self, routes: Router) -> Self {
        self.extra = self.extra.merge(routes);
        self
    }

    /// Bind and start serving.
    ///
    /// When the HTTP and WebSocket ports are the same non-zero port, one
    /// listener serves both.
    ///
    /// # Errors
    /// Returns error if already started or a port cannot be bound.
    pub async fn start(&mut self) -> Result<(), ServerError> {
        if self.http.is_some() {
            return Err(ServerError::AlreadyStarted);
        }

        let shared_port = self.config.port == self.config.socket_port && self.config.port != 0;
        let mut app = create_http_router(Arc::clone(&self.relay)).merge(self.extra.clone());
        if shared_port {
            app = app.merge(create_ws_router(Arc::clone(&self.relay)));
        }

        let http = self.listen(self.config.port, app).await?;
        tracing::info!(addr = %http.addr, "Listening for HTTP connections");

        if !shared_port {
            let ws_app = create_ws_router(Arc::clone(&self.relay));
            match self.listen(self.config.socket_port, ws_app).await {
                Ok(socket) => {
                    tracing::info!(addr = %socket.addr, "Listening for WebSocket connections");
                    self.socket = Some(socket);
                }
                Err(e) => {
                    let _ = http.shutdown.send(());
                    return Err(e);
                }
            }
        }

        self.http = Some(http);
        Ok(())
    }

    async fn listen(&self, port: u16, app: Router) -> Result<Listening, ServerError> {
        let addr = SocketAddr::new(self.config.host, port);
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let addr = listener.local_addr()?;

        let app = app
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive());

        let (shutdown, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = rx.await;
                })
                .await
        });

        Ok(Listening {
            addr,
            shutdown,
            task,
        })
    }

    /// Stop both listeners and wait for them to finish.
    ///
    /// # Errors
    /// Returns error if a listener task failed.
    pub async fn stop(&mut self) -> Result<(), ServerError> {
        tracing::info!("Stopping server...");
        if let Some(http) = self.http.take() {
            let _ = http.shutdown.send(());
            http.task.await??;
            tracing::info!("Stopped http server");
        }
        if let Some(socket) = self.socket.take() {
            let _ = socket.shutdown.send(());
            socket.task.await??;
            tracing::info!("Stopped ws server");
        }
        Ok(())
    }

    /// Whether the server is not running.
    #[must_use]
    pub const fn is_stopped(&self) -> bool {
        self.http.is_none()
    }

    /// Bound HTTP address while running.
    #[must_use]
    pub fn http_addr(&self) -> Option<SocketAddr> {
        self.http.as_ref().map(|l| l.addr)
    }

    /// Bound WebSocket address while running.
    #[must_use]
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().or(self.http.as_ref()).map(|l| l.addr)
    }

    /// Relay fed by this server.
    #[must_use]
    pub const fn relay(&self) -> &Arc<EventRelay> {
        &self.relay
    }
}
