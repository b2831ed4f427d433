//! vidquiz-qg library interface
//!
//! Video → transcript → segments → multiple-choice questions. Exposed as a library so
//! integration tests can drive the orchestrator and the router directly.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;
use vidquiz_common::events::EventBus;

use crate::config::PipelineSettings;
use crate::services::{InferenceApi, PipelineOrchestrator, PipelineWorkers, RemoteCallClient};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    pub orchestrator: Arc<PipelineOrchestrator>,
    pub workers: Arc<PipelineWorkers>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last failed job, for diagnostics
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    /// Wire the orchestrator and start the worker pool
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        api: Arc<dyn InferenceApi>,
        settings: PipelineSettings,
    ) -> Self {
        let remote = RemoteCallClient::new(api, settings.transcribe_retry(), settings.generate_retry());
        let orchestrator = Arc::new(PipelineOrchestrator::new(
            db,
            event_bus.clone(),
            remote,
            settings.clone(),
        ));
        let workers = Arc::new(PipelineWorkers::start(
            orchestrator.clone(),
            settings.worker_count,
            settings.queue_capacity,
            settings.admission,
            event_bus.clone(),
        ));

        Self {
            event_bus,
            orchestrator,
            workers,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::video_routes())
        .route("/events", get(api::event_stream))
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
