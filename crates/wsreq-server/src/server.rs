//! `EventServer`: axum WebSocket endpoint plus caller routes.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::response::IntoResponse;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use wsreq_core::{ConnectionId, LocalServer};

use crate::config::ServerConfig;
use crate::connection::ConnectionMap;
use crate::errors::ServerError;
use crate::registry::EventRegistry;
use crate::session::{self, SessionShared};

/// Shared state for the WebSocket upgrade handler.
#[derive(Clone)]
struct AppState {
    config: Arc<ServerConfig>,
    shared: SessionShared,
}

/// One listen cycle: the serve task and the token that stops it and its sessions.
struct Running {
    token: CancellationToken,
    task: JoinHandle<()>,
    addr: SocketAddr,
}

impl Running {
    /// Cancel the cycle and wait up to `timeout` for the serve task; abort it after that.
    async fn stop(self, timeout: Duration) -> SocketAddr {
        self.token.cancel();
        let abort = self.task.abort_handle();
        if tokio::time::timeout(timeout, self.task).await.is_err() {
            warn!(addr = %self.addr, ?timeout, "serve task did not stop in time, aborting");
            abort.abort();
        }
        self.addr
    }
}

/// An event-channel server that can be started and stopped repeatedly.
pub struct EventServer {
    config: Arc<ServerConfig>,
    registry: Arc<EventRegistry>,
    connections: Arc<ConnectionMap>,
    routes: Router,
    running: Mutex<Option<Running>>,
}

impl std::fmt::Debug for EventServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventServer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl EventServer {
    /// Create a server.
    ///
    /// A supplied registry must hold at least one handler; `None` attaches nothing.
    pub fn new(config: ServerConfig, registry: Option<EventRegistry>) -> Result<Self, ServerError> {
        let registry = match registry {
            Some(registry) => {
                registry.validate()?;
                registry
            }
            None => EventRegistry::new(),
        };
        let mut config = config;
        config.path = wsreq_core::url::normalize_path(&config.path);
        Ok(Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
            connections: Arc::new(ConnectionMap::new()),
            routes: Router::new(),
            running: Mutex::new(None),
        })
    }

    /// Merge caller HTTP routes into the served router.
    ///
    /// Routes must not overlap the WebSocket path.
    #[must_use]
    pub fn with_routes(mut self, routes: Router) -> Self {
        self.routes = self.routes.merge(routes);
        self
    }

    /// Live connections, for routes that emit.
    pub fn connections(&self) -> Arc<ConnectionMap> {
        self.connections.clone()
    }

    /// The attached registry.
    pub fn registry(&self) -> &EventRegistry {
        &self.registry
    }

    /// The server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Address of the current listen cycle, if any.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().await.as_ref().map(|r| r.addr)
    }

    /// Build the full router for one listen cycle.
    pub fn router(&self, token: CancellationToken) -> Router {
        let state = AppState {
            config: self.config.clone(),
            shared: SessionShared {
                registry: self.registry.clone(),
                connections: self.connections.clone(),
                token,
                send_queue: self.config.send_queue,
                ping_interval: Duration::from_secs(self.config.ping_interval_secs.max(1)),
            },
        };

        Router::new()
            .route(&self.config.path, get(ws_handler))
            .with_state(state)
            .merge(self.routes.clone())
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }
}

#[async_trait]
impl LocalServer for EventServer {
    async fn listen(&self, port: u16) -> std::io::Result<SocketAddr> {
        let mut running = self.running.lock().await;
        if let Some(current) = running.as_ref() {
            return Err(std::io::Error::other(format!(
                "server already listening on {}",
                current.addr
            )));
        }

        let listener = TcpListener::bind((self.config.host.as_str(), port)).await?;
        let addr = listener.local_addr()?;

        let token = CancellationToken::new();
        let router = self.router(token.clone());
        let serve_token = token.clone();
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, router)
                .with_graceful_shutdown(async move { serve_token.cancelled().await });
            if let Err(e) = serve.await {
                warn!(error = %e, "server stopped with error");
            }
        });

        info!(%addr, path = %self.config.path, "server listening");
        *running = Some(Running {
            token,
            task,
            addr,
        });
        Ok(addr)
    }

    async fn close(&self) {
        let Some(running) = self.running.lock().await.take() else {
            debug!("close called on idle server");
            return;
        };
        let timeout = Duration::from_millis(self.config.shutdown_timeout_ms);
        let addr = running.stop(timeout).await;
        info!(%addr, "server closed");
    }
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let id = ConnectionId::new();
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| session::run_session(socket, id, state.shared))
}
