//! galleria-collect library interface
//!
//! Exposes the collection engine, task bridge and HTTP router for the
//! binary and for integration tests.

pub mod api;
pub mod collector;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod tasks;
pub mod upstream;

pub use crate::error::{ApiError, ApiResult};

use axum::{routing::get, Router};
use chrono::{DateTime, Utc};
use galleria_common::events::EventBus;
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::tasks::TaskRunner;
use crate::upstream::ApiClient;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Background task bridge
    pub tasks: TaskRunner,
    /// Upstream API client
    pub client: Arc<ApiClient>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        tasks: TaskRunner,
        client: Arc<ApiClient>,
    ) -> Self {
        Self {
            db,
            event_bus,
            tasks,
            client,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::collect_routes())
        .route("/api/collect/events", get(api::collect_event_stream))
        .merge(api::health_routes())
        .with_state(state)
}
