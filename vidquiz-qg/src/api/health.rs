//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok", or "degraded" when the remote inference service is unreachable
    pub status: String,
    pub module: String,
    pub version: String,
    pub uptime_seconds: u64,
    /// "ok" or "unreachable"
    pub remote: String,
    /// Jobs queued or running
    pub jobs_in_flight: usize,
    /// Last failed job, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    let remote_ok = match state.orchestrator.remote().health().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Remote inference service health check failed");
            false
        }
    };

    let last_error = state.last_error.read().await.clone();

    Json(HealthResponse {
        status: if remote_ok { "ok" } else { "degraded" }.to_string(),
        module: "vidquiz-qg".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds,
        remote: if remote_ok { "ok" } else { "unreachable" }.to_string(),
        jobs_in_flight: state.workers.in_flight_count().await,
        last_error,
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
