//! Database access for galleria-collect
//!
//! SQLite via sqlx. Each accessor is one transactional statement; upserts
//! are per-row atomic so concurrent runs touching disjoint external ids need
//! no extra locking.

pub mod artworks;
pub mod collection_logs;
pub mod followed_users;

use anyhow::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize database connection pool and bootstrap tables
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_tables(&pool).await?;

    Ok(pool)
}

/// Create service tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    galleria_common::db::create_settings_table(pool).await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS artworks (
            id TEXT PRIMARY KEY,
            external_id INTEGER NOT NULL UNIQUE,
            title TEXT NOT NULL,
            author_id INTEGER NOT NULL,
            author_name TEXT NOT NULL,
            kind TEXT NOT NULL,
            page_count INTEGER NOT NULL DEFAULT 1,
            total_bookmarks INTEGER NOT NULL DEFAULT 0,
            total_view INTEGER NOT NULL DEFAULT 0,
            posted_at TEXT NOT NULL,
            tags TEXT NOT NULL DEFAULT '',
            is_r18 INTEGER NOT NULL DEFAULT 0,
            is_ai_flagged INTEGER NOT NULL DEFAULT 0,
            is_stale INTEGER NOT NULL DEFAULT 0,
            collected_via TEXT NOT NULL,
            collected_at TEXT NOT NULL,
            refreshed_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_artworks_refreshed_at ON artworks (is_stale, refreshed_at)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS followed_users (
            external_id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            last_synced_at TEXT,
            backfill_completed INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS collection_logs (
            id TEXT PRIMARY KEY,
            log_type TEXT NOT NULL,
            status TEXT NOT NULL,
            message TEXT NOT NULL,
            artworks_count INTEGER NOT NULL DEFAULT 0,
            started_at TEXT NOT NULL,
            finished_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (settings, artworks, followed_users, collection_logs)");

    Ok(())
}

/// A persistence failure that indicates the database itself is unavailable,
/// as opposed to a single bad row. Systemic failures abort the run.
pub fn is_systemic(error: &galleria_common::Error) -> bool {
    match error {
        galleria_common::Error::Database(db_err) => matches!(
            db_err,
            sqlx::Error::PoolClosed
                | sqlx::Error::PoolTimedOut
                | sqlx::Error::Io(_)
                | sqlx::Error::Protocol(_)
        ),
        galleria_common::Error::Io(_) => true,
        _ => false,
    }
}
