//! Health, readiness, and metrics endpoints.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::metrics::encode_metrics;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub connected: bool,
}

/// Shared state for the health endpoints.
#[derive(Clone)]
pub struct ServerState {
    pub connected: Arc<AtomicBool>,
}

impl ServerState {
    pub fn new(connected: Arc<AtomicBool>) -> Self {
        Self { connected }
    }
}

/// Always 200 while the process is up.
async fn health(State(state): State<ServerState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        connected: state.connected.load(Ordering::SeqCst),
    })
}

/// 200 only while the upstream subscription is connected.
async fn ready(State(state): State<ServerState>) -> (StatusCode, Json<HealthResponse>) {
    let connected = state.connected.load(Ordering::SeqCst);
    let status_code = if connected {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(HealthResponse {
            status: if connected { "ready" } else { "not_ready" }.to_string(),
            connected,
        }),
    )
}

/// Prometheus text exposition.
async fn metrics() -> (StatusCode, String) {
    match encode_metrics() {
        Ok(text) => (StatusCode::OK, text),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

pub fn create_router(state: ServerState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(metrics))
        .with_state(state)
}

pub async fn run_server(addr: SocketAddr, state: ServerState) -> std::io::Result<()> {
    let app = create_router(state);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}
