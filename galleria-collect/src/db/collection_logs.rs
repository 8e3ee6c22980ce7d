//! Collection log database operations

use crate::models::{CollectionLog, LogStatus, LogType};
use chrono::{DateTime, Utc};
use galleria_common::{Error, Result};
use sqlx::{Row, SqlitePool};

/// Insert or update a log row (the orchestrator saves incrementally)
pub async fn save_log(pool: &SqlitePool, log: &CollectionLog) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO collection_logs (
            id, log_type, status, message, artworks_count, started_at, finished_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            status = excluded.status,
            message = excluded.message,
            artworks_count = excluded.artworks_count,
            finished_at = excluded.finished_at
        "#,
    )
    .bind(log.id.to_string())
    .bind(log.log_type.as_str())
    .bind(log.status.as_str())
    .bind(&log.message)
    .bind(log.artworks_count as i64)
    .bind(log.started_at.to_rfc3339())
    .bind(log.finished_at.map(|dt| dt.to_rfc3339()))
    .execute(pool)
    .await
    .map_err(Error::Database)?;

    Ok(())
}

/// Load a log row by id
pub async fn load_log(pool: &SqlitePool, id: uuid::Uuid) -> Result<Option<CollectionLog>> {
    let row = sqlx::query("SELECT * FROM collection_logs WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await
        .map_err(Error::Database)?;

    row.map(log_from_row).transpose()
}

/// Most recent logs, newest first
pub async fn recent(pool: &SqlitePool, limit: u32) -> Result<Vec<CollectionLog>> {
    let rows = sqlx::query("SELECT * FROM collection_logs ORDER BY started_at DESC LIMIT ?")
        .bind(limit as i64)
        .fetch_all(pool)
        .await
        .map_err(Error::Database)?;

    rows.into_iter().map(log_from_row).collect()
}

/// Paged log listing with optional type/status filters.
///
/// Returns the page plus the total matching row count.
pub async fn list_page(
    pool: &SqlitePool,
    page: u32,
    per_page: u32,
    log_type: Option<LogType>,
    status: Option<LogStatus>,
) -> Result<(Vec<CollectionLog>, i64)> {
    let type_filter = log_type.map(|t| t.as_str().to_string());
    let status_filter = status.map(|s| s.as_str().to_string());
    let offset = page.saturating_sub(1) * per_page;

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM collection_logs
         WHERE (? IS NULL OR log_type = ?) AND (? IS NULL OR status = ?)",
    )
    .bind(&type_filter)
    .bind(&type_filter)
    .bind(&status_filter)
    .bind(&status_filter)
    .fetch_one(pool)
    .await
    .map_err(Error::Database)?;

    let rows = sqlx::query(
        "SELECT * FROM collection_logs
         WHERE (? IS NULL OR log_type = ?) AND (? IS NULL OR status = ?)
         ORDER BY started_at DESC
         LIMIT ? OFFSET ?",
    )
    .bind(&type_filter)
    .bind(&type_filter)
    .bind(&status_filter)
    .bind(&status_filter)
    .bind(per_page as i64)
    .bind(offset as i64)
    .fetch_all(pool)
    .await
    .map_err(Error::Database)?;

    let logs = rows
        .into_iter()
        .map(log_from_row)
        .collect::<Result<Vec<_>>>()?;

    Ok((logs, total))
}

/// Delete logs that started before the cutoff. Returns the deleted count.
pub async fn delete_older_than(pool: &SqlitePool, cutoff: DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query("DELETE FROM collection_logs WHERE started_at < ?")
        .bind(cutoff.to_rfc3339())
        .execute(pool)
        .await
        .map_err(Error::Database)?;

    Ok(result.rows_affected())
}

/// Total log rows
pub async fn count(pool: &SqlitePool) -> Result<i64> {
    sqlx::query_scalar("SELECT COUNT(*) FROM collection_logs")
        .fetch_one(pool)
        .await
        .map_err(Error::Database)
}

fn log_from_row(row: sqlx::sqlite::SqliteRow) -> Result<CollectionLog> {
    let id: String = row.get("id");
    let id = uuid::Uuid::parse_str(&id).map_err(|e| Error::Internal(format!("Bad log id: {}", e)))?;

    let log_type: String = row.get("log_type");
    let log_type: LogType = log_type
        .parse()
        .map_err(|e| Error::Internal(format!("Bad log type: {}", e)))?;

    let status: String = row.get("status");
    let status: LogStatus = status
        .parse()
        .map_err(|e| Error::Internal(format!("Bad log status: {}", e)))?;

    let started_at: String = row.get("started_at");
    let started_at = DateTime::parse_from_rfc3339(&started_at)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Bad started_at: {}", e)))?;

    let finished_at: Option<String> = row.get("finished_at");
    let finished_at = finished_at
        .map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| Error::Internal(format!("Bad finished_at: {}", e)))
        })
        .transpose()?;

    Ok(CollectionLog {
        id,
        log_type,
        status,
        message: row.get("message"),
        artworks_count: row.get::<i64, _>("artworks_count") as u32,
        started_at,
        finished_at,
    })
}
