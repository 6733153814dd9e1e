//! # HTTP Server
//!
//! Liveness, readiness and Prometheus metrics endpoints.

use crate::observability::metrics;
use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Shared state for the probe handlers
#[derive(Debug, Clone, Default)]
pub struct ServerState {
    /// Set once the listener is bound
    pub is_ready: Arc<AtomicBool>,
}

impl ServerState {
    /// Whether `/readyz` answers 200
    pub fn is_ready(&self) -> bool {
        self.is_ready.load(Ordering::Relaxed)
    }
}

/// Build the router, nesting every route under `route_prefix` when set
pub fn router(route_prefix: &str, state: Arc<ServerState>) -> Router {
    let routes = Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics_handler))
        .with_state(state);

    let app = if route_prefix.is_empty() {
        routes
    } else {
        Router::new().nest(route_prefix, routes)
    };
    app.layer(TraceLayer::new_for_http())
}

/// Bind `addr` and serve until `cancel` fires
#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub async fn start_server(
    addr: SocketAddr,
    route_prefix: String,
    state: Arc<ServerState>,
    cancel: CancellationToken,
) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind HTTP server to {addr}"))?;
    serve(listener, &route_prefix, state, cancel).await
}

/// Serve on an already bound listener until `cancel` fires
#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub async fn serve(
    listener: TcpListener,
    route_prefix: &str,
    state: Arc<ServerState>,
    cancel: CancellationToken,
) -> Result<()> {
    let local_addr = listener.local_addr()?;
    let app = router(route_prefix, Arc::clone(&state));
    info!(address = %local_addr, route_prefix, "HTTP server listening");
    state.is_ready.store(true, Ordering::Relaxed);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .context("HTTP server failed")?;
    state.is_ready.store(false, Ordering::Relaxed);
    info!("HTTP server stopped");
    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

async fn readyz(State(state): State<Arc<ServerState>>) -> Response {
    if state.is_ready() {
        (StatusCode::OK, "ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready").into_response()
    }
}

async fn metrics_handler() -> Response {
    match metrics::gather_text() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
