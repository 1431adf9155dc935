//! # HTTP Server
//!
//! Prometheus metrics and liveness/readiness probes.
//!
//! - `/metrics` - Prometheus text format
//! - `/healthz` - 200 once the process is up
//! - `/readyz` - 200 once the CSR cache has completed its initial sync

use crate::observability::metrics::gather_metrics;
use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Shared server state
#[derive(Debug, Default)]
pub struct ServerState {
    /// Set once the listener is bound
    pub is_serving: AtomicBool,
    /// Set once the CSR cache has synced and workers are running
    pub is_ready: AtomicBool,
}

impl ServerState {
    pub fn mark_ready(&self) {
        self.is_ready.store(true, Ordering::Relaxed);
    }

    pub fn mark_not_ready(&self) {
        self.is_ready.store(false, Ordering::Relaxed);
    }
}

/// Build the probe and metrics router
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `port` and serve until the process exits
pub async fn start_server(port: u16, state: Arc<ServerState>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("Failed to bind metrics server to port {port}"))?;
    info!("Metrics and probe server listening on port {}", port);
    state.is_serving.store(true, Ordering::Relaxed);

    axum::serve(listener, router(state))
        .await
        .context("Metrics server terminated")
}

async fn metrics_handler() -> impl IntoResponse {
    match gather_metrics() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
        }
    }
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn readyz(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    if state.is_ready.load(Ordering::Relaxed) {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}
