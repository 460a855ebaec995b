//! Relay server lifecycle: bind, serve, stop.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Router, routing::get};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::error::HubError;
use crate::handlers;
use crate::hub::Hub;
use crate::metrics::ServerMetrics;

/// Shared state handed to the axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<Hub>,
    pub metrics: Arc<ServerMetrics>,
    pub send_queue_len: usize,
}

#[derive(Clone, Copy)]
enum ListenState {
    Idle,
    Listening(SocketAddr),
}

/// Owns the hub and the listening socket. `start` once, `stop` at process
/// shutdown; a second `start` on the same instance is rejected.
pub struct RelayServer {
    hub: Arc<Hub>,
    metrics: Arc<ServerMetrics>,
    config: ServerConfig,
    listen: Mutex<ListenState>,
    shutdown: CancellationToken,
}

impl RelayServer {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            hub: Arc::new(Hub::new()),
            metrics: Arc::new(ServerMetrics::new()),
            config,
            listen: Mutex::new(ListenState::Idle),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    pub fn metrics(&self) -> &Arc<ServerMetrics> {
        &self.metrics
    }

    /// Bind the configured address and serve in the background. Returns the
    /// bound address (meaningful when the configured port is 0).
    pub async fn start(&self) -> Result<SocketAddr, HubError> {
        let mut listen = self.listen.lock().await;
        if let ListenState::Listening(addr) = *listen {
            return Err(HubError::AlreadyStarted(addr));
        }

        let addr = self.config.bind;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| HubError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| HubError::Bind { addr, source })?;

        let app = router(AppState {
            hub: self.hub.clone(),
            metrics: self.metrics.clone(),
            send_queue_len: self.config.send_queue_len,
        });

        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await;
            if let Err(e) = result {
                error!("relay server error: {}", e);
            }
        });

        *listen = ListenState::Listening(local_addr);
        Ok(local_addr)
    }

    /// Stop accepting connections and drop every open one. Best-effort:
    /// queued deliveries already in flight may or may not land.
    pub async fn stop(&self) {
        self.shutdown.cancel();
        self.hub.shutdown().await;
        info!("relay hub stopped");
    }
}

/// Build the relay router. The WebSocket endpoint answers at both `/` and
/// `/ws` — the original clients dial `ws://127.0.0.1:8080` with no path.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::relay_ws_handler))
        .route("/ws", get(handlers::relay_ws_handler))
        .route("/health", get(handlers::health_handler))
        .route("/health/live", get(handlers::health_live_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
