//! Upstream client tests: auth recovery and error typing

mod helpers;

use axum::extract::Query;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use galleria_collect::upstream::{RankingPeriod, UpstreamError};
use helpers::{item_json, listing_json, spawn_upstream, test_client, test_pool};
use std::collections::HashMap;

#[tokio::test]
async fn rejected_token_is_refreshed_once_and_request_retried() {
    let pool = test_pool().await;

    // The initial token is rejected; only the refreshed one is accepted
    let upstream = Router::new()
        .route(
            "/v1/illust/ranking",
            get(|headers: HeaderMap| async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default();
                if auth == "Bearer fresh-token" {
                    Json(listing_json(vec![item_json(1, 500, 5000, 48)], None)).into_response()
                } else {
                    StatusCode::UNAUTHORIZED.into_response()
                }
            }),
        )
        .route(
            "/auth/token",
            post(|| async {
                Json(serde_json::json!({
                    "access_token": "fresh-token",
                    "refresh_token": "fresh-refresh",
                    "expires_in": 3600,
                }))
            }),
        );
    let base_url = spawn_upstream(upstream).await;

    let client = test_client(&pool, &base_url);
    let page = client.fetch_ranking(RankingPeriod::Day, 0).await.unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].id, 1);

    // The refreshed pair was persisted for the next process start
    let stored: Option<String> = galleria_common::db::get_setting(&pool, "access_token")
        .await
        .unwrap();
    assert_eq!(stored.as_deref(), Some("fresh-token"));
    let stored: Option<String> = galleria_common::db::get_setting(&pool, "refresh_token")
        .await
        .unwrap();
    assert_eq!(stored.as_deref(), Some("fresh-refresh"));
}

#[tokio::test]
async fn persistent_rejection_after_refresh_is_a_credential_error() {
    let pool = test_pool().await;

    // Even the refreshed token is rejected
    let upstream = Router::new()
        .route(
            "/v1/illust/ranking",
            get(|| async { StatusCode::UNAUTHORIZED.into_response() }),
        )
        .route(
            "/auth/token",
            post(|| async {
                Json(serde_json::json!({
                    "access_token": "still-bad",
                    "refresh_token": "still-bad",
                    "expires_in": 3600,
                }))
            }),
        );
    let base_url = spawn_upstream(upstream).await;

    let client = test_client(&pool, &base_url);
    let err = client.fetch_ranking(RankingPeriod::Day, 0).await.unwrap_err();
    assert!(matches!(err, UpstreamError::Credential(_)));
}

#[tokio::test]
async fn api_errors_carry_the_upstream_status() {
    let pool = test_pool().await;

    let upstream = Router::new().route(
        "/v1/illust/ranking",
        get(|| async { (StatusCode::TOO_MANY_REQUESTS, "slow down").into_response() }),
    );
    let base_url = spawn_upstream(upstream).await;

    let client = test_client(&pool, &base_url);
    let err = client.fetch_ranking(RankingPeriod::Day, 0).await.unwrap_err();
    assert_eq!(err.status(), Some(429));
}

#[tokio::test]
async fn search_paginates_via_next_url_offset() {
    let pool = test_pool().await;

    let upstream = Router::new().route(
        "/v1/search/illust",
        get(|Query(params): Query<HashMap<String, String>>| async move {
            assert_eq!(params.get("word").map(String::as_str), Some("landscape"));
            let offset: u32 = params.get("offset").and_then(|s| s.parse().ok()).unwrap_or(0);
            match offset {
                0 => Json(listing_json(vec![item_json(1, 500, 5000, 48)], Some(30))),
                _ => Json(listing_json(vec![item_json(2, 500, 5000, 48)], None)),
            }
        }),
    );
    let base_url = spawn_upstream(upstream).await;
    let client = test_client(&pool, &base_url);

    let first = client.search("landscape", 0).await.unwrap();
    assert_eq!(first.next_offset, Some(30));

    let second = client.search("landscape", first.next_offset.unwrap()).await.unwrap();
    assert_eq!(second.items[0].id, 2);
    assert_eq!(second.next_offset, None);
}
