//! galleria-collect - Artwork metadata collection service
//!
//! Collects artwork metadata from the upstream gallery platform (rankings,
//! followed users, keyword search), scores and filters it, and persists
//! results while pacing requests to respect the platform's anti-abuse
//! limits. Collection runs execute as background tasks submitted and
//! polled over HTTP.

use anyhow::Result;
use galleria_collect::config::CollectorConfig;
use galleria_collect::tasks::TaskRunner;
use galleria_collect::upstream::{ApiClient, CredentialStore};
use galleria_collect::AppState;
use galleria_common::events::EventBus;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:5780";
const DEFAULT_UPSTREAM_BASE_URL: &str = "https://app-api.gallery.example";
const DEFAULT_UPSTREAM_AUTH_URL: &str = "https://oauth.gallery.example/auth/token";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting galleria-collect");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Bootstrap configuration: listen address, database path, credentials
    let toml_config = galleria_common::config::load_or_default()?;

    let db_path = galleria_common::config::resolve_database_path(&toml_config);
    info!("Database: {}", db_path.display());
    let db_pool = galleria_collect::db::init_database_pool(&db_path).await?;
    info!("Database connection established");

    // Upstream client behind the mutex-guarded credential store
    let auth_url = toml_config
        .upstream_auth_url
        .clone()
        .unwrap_or_else(|| DEFAULT_UPSTREAM_AUTH_URL.to_string());
    let base_url = toml_config
        .upstream_base_url
        .clone()
        .unwrap_or_else(|| DEFAULT_UPSTREAM_BASE_URL.to_string());

    let credentials = CredentialStore::load(db_pool.clone(), auth_url, &toml_config).await?;
    let client = Arc::new(ApiClient::new(base_url, Arc::new(credentials)));

    // Worker pool sizing and task retention come from the settings table
    let collector_config = CollectorConfig::load(&db_pool).await?;

    let event_bus = EventBus::new(256);
    let tasks = TaskRunner::new(
        db_pool.clone(),
        client.clone(),
        event_bus.clone(),
        collector_config.worker_count,
        Duration::from_secs(collector_config.task_retention_secs),
    );

    let state = AppState::new(db_pool, event_bus, tasks, client);
    let app = galleria_collect::build_router(state);

    let listen_addr = toml_config
        .listen_addr
        .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    info!("Listening on http://{}", listen_addr);
    info!("Health check: http://{}/health", listen_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
