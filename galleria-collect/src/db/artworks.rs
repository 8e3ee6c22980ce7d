//! Artwork database operations

use crate::models::{Artwork, ArtworkKind, LogType};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use galleria_common::{Error, Result};

/// Insert an artwork, ignoring it when the external id is already present.
///
/// Returns true when a row was inserted.
pub async fn insert_if_absent(pool: &SqlitePool, artwork: &Artwork) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO artworks (
            id, external_id, title, author_id, author_name, kind,
            page_count, total_bookmarks, total_view, posted_at, tags,
            is_r18, is_ai_flagged, is_stale, collected_via, collected_at, refreshed_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(external_id) DO NOTHING
        "#,
    )
    .bind(artwork.id.to_string())
    .bind(artwork.external_id)
    .bind(&artwork.title)
    .bind(artwork.author_id)
    .bind(&artwork.author_name)
    .bind(artwork.kind.as_str())
    .bind(artwork.page_count as i64)
    .bind(artwork.total_bookmarks as i64)
    .bind(artwork.total_view as i64)
    .bind(artwork.posted_at.to_rfc3339())
    .bind(&artwork.tags)
    .bind(artwork.is_r18 as i64)
    .bind(artwork.is_ai_flagged as i64)
    .bind(artwork.is_stale as i64)
    .bind(artwork.collected_via.as_str())
    .bind(artwork.collected_at.to_rfc3339())
    .bind(artwork.refreshed_at.to_rfc3339())
    .execute(pool)
    .await
    .map_err(Error::Database)?;

    Ok(result.rows_affected() > 0)
}

/// Insert or refresh an artwork by external id.
///
/// On conflict the descriptive fields and metrics are overwritten; the
/// collection provenance (`collected_via`, `collected_at`) of the original
/// row is kept.
pub async fn upsert(pool: &SqlitePool, artwork: &Artwork) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO artworks (
            id, external_id, title, author_id, author_name, kind,
            page_count, total_bookmarks, total_view, posted_at, tags,
            is_r18, is_ai_flagged, is_stale, collected_via, collected_at, refreshed_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(external_id) DO UPDATE SET
            title = excluded.title,
            author_name = excluded.author_name,
            kind = excluded.kind,
            page_count = excluded.page_count,
            total_bookmarks = excluded.total_bookmarks,
            total_view = excluded.total_view,
            tags = excluded.tags,
            is_r18 = excluded.is_r18,
            is_ai_flagged = excluded.is_ai_flagged
        "#,
    )
    .bind(artwork.id.to_string())
    .bind(artwork.external_id)
    .bind(&artwork.title)
    .bind(artwork.author_id)
    .bind(&artwork.author_name)
    .bind(artwork.kind.as_str())
    .bind(artwork.page_count as i64)
    .bind(artwork.total_bookmarks as i64)
    .bind(artwork.total_view as i64)
    .bind(artwork.posted_at.to_rfc3339())
    .bind(&artwork.tags)
    .bind(artwork.is_r18 as i64)
    .bind(artwork.is_ai_flagged as i64)
    .bind(artwork.is_stale as i64)
    .bind(artwork.collected_via.as_str())
    .bind(artwork.collected_at.to_rfc3339())
    .bind(artwork.refreshed_at.to_rfc3339())
    .execute(pool)
    .await
    .map_err(Error::Database)?;

    Ok(())
}

/// Load an artwork by its platform-side id
pub async fn get_by_external_id(pool: &SqlitePool, external_id: i64) -> Result<Option<Artwork>> {
    let row = sqlx::query("SELECT * FROM artworks WHERE external_id = ?")
        .bind(external_id)
        .fetch_optional(pool)
        .await
        .map_err(Error::Database)?;

    row.map(artwork_from_row).transpose()
}

/// Re-tag the collection mode an artwork is attributed to
pub async fn set_collected_via(pool: &SqlitePool, external_id: i64, via: LogType) -> Result<()> {
    sqlx::query("UPDATE artworks SET collected_via = ? WHERE external_id = ?")
        .bind(via.as_str())
        .bind(external_id)
        .execute(pool)
        .await
        .map_err(Error::Database)?;

    Ok(())
}

/// Overwrite the mutable metric fields after a metadata refresh
pub async fn update_metrics(
    pool: &SqlitePool,
    external_id: i64,
    total_bookmarks: u32,
    total_view: u32,
    refreshed_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        "UPDATE artworks
         SET total_bookmarks = ?, total_view = ?, refreshed_at = ?
         WHERE external_id = ?",
    )
    .bind(total_bookmarks as i64)
    .bind(total_view as i64)
    .bind(refreshed_at.to_rfc3339())
    .bind(external_id)
    .execute(pool)
    .await
    .map_err(Error::Database)?;

    Ok(())
}

/// Record that the refresh ran, without changing metrics
pub async fn touch_refreshed(
    pool: &SqlitePool,
    external_id: i64,
    refreshed_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query("UPDATE artworks SET refreshed_at = ? WHERE external_id = ?")
        .bind(refreshed_at.to_rfc3339())
        .bind(external_id)
        .execute(pool)
        .await
        .map_err(Error::Database)?;

    Ok(())
}

/// Artworks whose metadata has not been refreshed since the cutoff,
/// oldest refresh first
pub async fn list_due_for_refresh(
    pool: &SqlitePool,
    cutoff: DateTime<Utc>,
    limit: u32,
) -> Result<Vec<Artwork>> {
    let rows = sqlx::query(
        "SELECT * FROM artworks
         WHERE is_stale = 0 AND refreshed_at < ?
         ORDER BY refreshed_at ASC
         LIMIT ?",
    )
    .bind(cutoff.to_rfc3339())
    .bind(limit as i64)
    .fetch_all(pool)
    .await
    .map_err(Error::Database)?;

    rows.into_iter().map(artwork_from_row).collect()
}

/// Mark an artwork as no longer retrievable upstream
pub async fn mark_stale(pool: &SqlitePool, external_id: i64) -> Result<()> {
    sqlx::query("UPDATE artworks SET is_stale = 1 WHERE external_id = ?")
        .bind(external_id)
        .execute(pool)
        .await
        .map_err(Error::Database)?;

    Ok(())
}

/// Delete an artwork row (delete policy for removed-upstream works)
pub async fn delete_by_external_id(pool: &SqlitePool, external_id: i64) -> Result<()> {
    sqlx::query("DELETE FROM artworks WHERE external_id = ?")
        .bind(external_id)
        .execute(pool)
        .await
        .map_err(Error::Database)?;

    Ok(())
}

/// Total artwork rows
pub async fn count(pool: &SqlitePool) -> Result<i64> {
    sqlx::query_scalar("SELECT COUNT(*) FROM artworks")
        .fetch_one(pool)
        .await
        .map_err(Error::Database)
}

fn artwork_from_row(row: sqlx::sqlite::SqliteRow) -> Result<Artwork> {
    let id: String = row.get("id");
    let id = uuid::Uuid::parse_str(&id)
        .map_err(|e| Error::Internal(format!("Bad artwork id: {}", e)))?;

    let kind: String = row.get("kind");
    let kind: ArtworkKind = kind
        .parse()
        .map_err(|e| Error::Internal(format!("Bad artwork kind: {}", e)))?;

    let collected_via: String = row.get("collected_via");
    let collected_via: LogType = collected_via
        .parse()
        .map_err(|e| Error::Internal(format!("Bad collected_via: {}", e)))?;

    Ok(Artwork {
        id,
        external_id: row.get("external_id"),
        title: row.get("title"),
        author_id: row.get("author_id"),
        author_name: row.get("author_name"),
        kind,
        page_count: row.get::<i64, _>("page_count") as u32,
        total_bookmarks: row.get::<i64, _>("total_bookmarks") as u32,
        total_view: row.get::<i64, _>("total_view") as u32,
        posted_at: parse_datetime(row.get("posted_at"))?,
        tags: row.get("tags"),
        is_r18: row.get::<i64, _>("is_r18") != 0,
        is_ai_flagged: row.get::<i64, _>("is_ai_flagged") != 0,
        is_stale: row.get::<i64, _>("is_stale") != 0,
        collected_via,
        collected_at: parse_datetime(row.get("collected_at"))?,
        refreshed_at: parse_datetime(row.get("refreshed_at"))?,
    })
}

fn parse_datetime(value: String) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Bad timestamp '{}': {}", value, e)))
}
