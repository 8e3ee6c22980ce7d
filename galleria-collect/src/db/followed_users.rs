//! Followed user database operations

use crate::models::FollowedUser;
use chrono::{DateTime, Utc};
use galleria_common::{Error, Result};
use sqlx::{Row, SqlitePool};

/// Insert a followed user, ignoring existing rows.
///
/// Returns true when a row was inserted.
pub async fn insert_if_absent(pool: &SqlitePool, user: &FollowedUser) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO followed_users (external_id, name, last_synced_at, backfill_completed, created_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(external_id) DO NOTHING
        "#,
    )
    .bind(user.external_id)
    .bind(&user.name)
    .bind(user.last_synced_at.map(|dt| dt.to_rfc3339()))
    .bind(user.backfill_completed as i64)
    .bind(user.created_at.to_rfc3339())
    .execute(pool)
    .await
    .map_err(Error::Database)?;

    Ok(result.rows_affected() > 0)
}

/// Load a followed user by platform-side id
pub async fn get(pool: &SqlitePool, external_id: i64) -> Result<Option<FollowedUser>> {
    let row = sqlx::query("SELECT * FROM followed_users WHERE external_id = ?")
        .bind(external_id)
        .fetch_optional(pool)
        .await
        .map_err(Error::Database)?;

    row.map(user_from_row).transpose()
}

/// All followed users, oldest first
pub async fn list_all(pool: &SqlitePool) -> Result<Vec<FollowedUser>> {
    let rows = sqlx::query("SELECT * FROM followed_users ORDER BY created_at ASC")
        .fetch_all(pool)
        .await
        .map_err(Error::Database)?;

    rows.into_iter().map(user_from_row).collect()
}

/// Followed users whose historical backfill has not completed
pub async fn list_pending_backfill(pool: &SqlitePool) -> Result<Vec<FollowedUser>> {
    let rows = sqlx::query(
        "SELECT * FROM followed_users WHERE backfill_completed = 0 ORDER BY created_at ASC",
    )
    .fetch_all(pool)
    .await
    .map_err(Error::Database)?;

    rows.into_iter().map(user_from_row).collect()
}

/// Refresh the display name the platform reports
pub async fn update_name(pool: &SqlitePool, external_id: i64, name: &str) -> Result<()> {
    sqlx::query("UPDATE followed_users SET name = ? WHERE external_id = ?")
        .bind(name)
        .bind(external_id)
        .execute(pool)
        .await
        .map_err(Error::Database)?;

    Ok(())
}

/// Record a completed works pull for this user
pub async fn mark_synced(
    pool: &SqlitePool,
    external_id: i64,
    synced_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query("UPDATE followed_users SET last_synced_at = ? WHERE external_id = ?")
        .bind(synced_at.to_rfc3339())
        .bind(external_id)
        .execute(pool)
        .await
        .map_err(Error::Database)?;

    Ok(())
}

/// Record that the user's historical backfill finished
pub async fn set_backfill_completed(pool: &SqlitePool, external_id: i64) -> Result<()> {
    sqlx::query("UPDATE followed_users SET backfill_completed = 1 WHERE external_id = ?")
        .bind(external_id)
        .execute(pool)
        .await
        .map_err(Error::Database)?;

    Ok(())
}

/// Total followed-user rows
pub async fn count(pool: &SqlitePool) -> Result<i64> {
    sqlx::query_scalar("SELECT COUNT(*) FROM followed_users")
        .fetch_one(pool)
        .await
        .map_err(Error::Database)
}

fn user_from_row(row: sqlx::sqlite::SqliteRow) -> Result<FollowedUser> {
    let last_synced_at: Option<String> = row.get("last_synced_at");
    let last_synced_at = last_synced_at
        .map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| Error::Internal(format!("Bad last_synced_at: {}", e)))
        })
        .transpose()?;

    let created_at: String = row.get("created_at");
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Bad created_at: {}", e)))?;

    Ok(FollowedUser {
        external_id: row.get("external_id"),
        name: row.get("name"),
        last_synced_at,
        backfill_completed: row.get::<i64, _>("backfill_completed") != 0,
        created_at,
    })
}
