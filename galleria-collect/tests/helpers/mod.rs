//! Shared helpers for integration tests
#![allow(dead_code)]

use axum::Router;
use chrono::{Duration, Utc};
use galleria_collect::upstream::{ApiClient, ApiCredential, CredentialStore};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::sync::Arc;

/// Fresh in-memory database with tables created
pub async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await
        .expect("connect in-memory sqlite");
    galleria_collect::db::init_tables(&pool)
        .await
        .expect("init tables");
    pool
}

/// Zero out every delay window so runs finish immediately
pub async fn fast_settings(pool: &SqlitePool) {
    use galleria_common::db::set_setting;

    for key in [
        "api_delay_min",
        "api_delay_max",
        "api_batch_pause_min",
        "api_batch_pause_max",
        "error_delay_429_min",
        "error_delay_429_max",
        "error_delay_403_min",
        "error_delay_403_max",
        "error_delay_other_min",
        "error_delay_other_max",
    ] {
        set_setting(pool, key, 0.0).await.unwrap();
    }
}

/// Client with a static, far-from-expiry credential (no refresh traffic)
pub fn test_client(pool: &SqlitePool, base_url: &str) -> Arc<ApiClient> {
    let credential = ApiCredential {
        access_token: "test-token".to_string(),
        refresh_token: "test-refresh".to_string(),
        expires_at: Some(Utc::now() + Duration::hours(2)),
    };
    let store = CredentialStore::new(
        pool.clone(),
        format!("{}/auth/token", base_url),
        credential,
    );
    Arc::new(ApiClient::new(base_url.to_string(), Arc::new(store)))
}

/// Serve a stub upstream router on an ephemeral port, returning its base URL
pub async fn spawn_upstream(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub upstream");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });
    format!("http://{}", addr)
}

/// One upstream artwork item as JSON
pub fn item_json(id: i64, bookmarks: u32, views: u32, age_hours: i64) -> serde_json::Value {
    let posted = Utc::now() - Duration::hours(age_hours);
    serde_json::json!({
        "id": id,
        "title": format!("work {}", id),
        "type": "illust",
        "user": { "id": id % 100 + 1, "name": format!("artist {}", id % 100 + 1) },
        "tags": [{ "name": "scenery" }],
        "create_date": posted.to_rfc3339(),
        "page_count": 1,
        "total_bookmarks": bookmarks,
        "total_view": views,
        "illust_ai_type": 1,
    })
}

/// Listing page payload with an optional continuation offset
pub fn listing_json(items: Vec<serde_json::Value>, next_offset: Option<u32>) -> serde_json::Value {
    serde_json::json!({
        "illusts": items,
        "next_url": next_offset.map(|o| format!("http://upstream.test/page?offset={}", o)),
    })
}
