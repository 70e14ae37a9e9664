//! `EngineServer`: the axum HTTP surface around an [`Engine`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{any, get};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::engine::Engine;
use crate::handler::handle_request;
use crate::health::{self, HealthResponse};
use crate::shutdown::ShutdownCoordinator;

/// Shared state accessible from axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// The session registry.
    pub engine: Arc<Engine>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle, when metrics are exported.
    pub metrics: Option<PrometheusHandle>,
}

/// HTTP server exposing one engine.
pub struct EngineServer {
    config: ServerConfig,
    engine: Arc<Engine>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
}

impl EngineServer {
    /// Create a new server.
    pub fn new(config: ServerConfig, engine: Arc<Engine>) -> Self {
        Self {
            config,
            engine,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics: None,
        }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            engine: Arc::clone(&self.engine),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        let path = self.config.path.as_str();
        let mut router = Router::new()
            .route(path, any(handle_request))
            .route("/health", get(health_handler));

        // accept the path with and without its trailing slash
        let trimmed = path.trim_end_matches('/');
        if !trimmed.is_empty() && trimmed != path {
            router = router.route(trimmed, any(handle_request));
        }
        if self.metrics.is_some() {
            router = router.route("/metrics", get(metrics_handler));
        }

        let body_limit = DefaultBodyLimit::max(self.engine.config().max_payload_bytes());
        let router = router
            .with_state(state)
            .layer(body_limit)
            .layer(TraceLayer::new_for_http());
        if self.config.cors {
            router.layer(CorsLayer::permissive())
        } else {
            router
        }
    }

    /// Bind the configured address and serve until shutdown.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        let addr = listener.local_addr()?;
        let app = self.router();
        let token = self.shutdown.token();

        let handle = tokio::spawn(async move {
            if let Err(error) = axum::serve(listener, app)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(%error, "server error");
            }
        });

        info!(%addr, path = %self.config.path, "engine listening");
        Ok((addr, handle))
    }

    /// Close every session with `server shutting down`, stop accepting
    /// requests, and wait up to `timeout` for the sessions and `handles`.
    ///
    /// Returns `false` if the timeout passed first.
    pub async fn graceful_shutdown(
        &self,
        handles: Vec<JoinHandle<()>>,
        timeout: Option<Duration>,
    ) -> bool {
        self.shutdown
            .graceful_shutdown(&self.engine, handles, timeout)
            .await
    }

    /// The engine behind this server.
    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.engine.session_count(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => crate::metrics::render(handle).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
