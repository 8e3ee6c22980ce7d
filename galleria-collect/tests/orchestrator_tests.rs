//! End-to-end orchestrator tests against a stub upstream server

mod helpers;

use axum::extract::Query;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{Duration, Utc};
use galleria_collect::collector::{CollectMode, CollectionOrchestrator};
use galleria_collect::db::{artworks, collection_logs, followed_users};
use galleria_collect::models::{FollowedUser, LogStatus, LogType};
use galleria_collect::upstream::RankingPeriod;
use galleria_common::events::EventBus;
use helpers::{fast_settings, item_json, listing_json, spawn_upstream, test_client, test_pool};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

fn offset_of(params: &HashMap<String, String>) -> u32 {
    params.get("offset").and_then(|s| s.parse().ok()).unwrap_or(0)
}

async fn run_mode(
    pool: &sqlx::SqlitePool,
    base_url: &str,
    mode: CollectMode,
) -> galleria_collect::collector::RunOutcome {
    let client = test_client(pool, base_url);
    let orchestrator = CollectionOrchestrator::new(
        pool.clone(),
        client,
        EventBus::new(64),
        CancellationToken::new(),
    );
    orchestrator.run(mode).await
}

#[tokio::test]
async fn ranking_failure_on_page_three_leaves_earlier_pages_and_partial_status() {
    let pool = test_pool().await;
    fast_settings(&pool).await;

    // Pages 1-2 succeed, page 3 always fails
    let upstream = Router::new().route(
        "/v1/illust/ranking",
        get(|Query(params): Query<HashMap<String, String>>| async move {
            match offset_of(&params) {
                0 => Json(listing_json(
                    vec![item_json(1, 500, 5000, 48), item_json(2, 600, 6000, 48), item_json(3, 700, 7000, 48)],
                    Some(30),
                ))
                .into_response(),
                30 => Json(listing_json(
                    vec![item_json(4, 500, 5000, 48), item_json(5, 600, 6000, 48), item_json(6, 700, 7000, 48)],
                    Some(60),
                ))
                .into_response(),
                _ => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
            }
        }),
    );
    let base_url = spawn_upstream(upstream).await;

    let outcome = run_mode(
        &pool,
        &base_url,
        CollectMode::RankingWorks {
            period: RankingPeriod::Day,
            pages: None,
        },
    )
    .await;

    // Pages 1-2 persisted, run downgraded to partial rather than failed
    assert_eq!(outcome.status, LogStatus::Partial);
    assert_eq!(outcome.artworks_count, 6);
    assert_eq!(artworks::count(&pool).await.unwrap(), 6);

    let log = collection_logs::load_log(&pool, outcome.log_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(log.status, LogStatus::Partial);
    assert_eq!(log.artworks_count, 6);
    assert!(log.finished_at.is_some());

    let persisted = artworks::get_by_external_id(&pool, 4).await.unwrap().unwrap();
    assert_eq!(persisted.collected_via, LogType::RankingWorks);
}

#[tokio::test]
async fn ranking_success_is_bounded_by_page_cap() {
    let pool = test_pool().await;
    fast_settings(&pool).await;

    // Endless listing; the run must stop at the requested page cap
    let upstream = Router::new().route(
        "/v1/illust/ranking",
        get(|Query(params): Query<HashMap<String, String>>| async move {
            let offset = offset_of(&params);
            Json(listing_json(
                vec![item_json(offset as i64 + 1, 500, 5000, 48)],
                Some(offset + 30),
            ))
        }),
    );
    let base_url = spawn_upstream(upstream).await;

    let outcome = run_mode(
        &pool,
        &base_url,
        CollectMode::RankingWorks {
            period: RankingPeriod::Day,
            pages: Some(2),
        },
    )
    .await;

    assert_eq!(outcome.status, LogStatus::Succeeded);
    assert_eq!(outcome.artworks_count, 2);
    assert_eq!(artworks::count(&pool).await.unwrap(), 2);
}

#[tokio::test]
async fn custom_ranking_scores_filters_and_survives_later_keyword_failure() {
    let pool = test_pool().await;
    fast_settings(&pool).await;

    let upstream = Router::new().route(
        "/v1/search/illust",
        get(|Query(params): Query<HashMap<String, String>>| async move {
            match params.get("word").map(String::as_str) {
                Some("landscape") => {
                    // One clear accept (1000/(6+2) * 0.1 = 12.5 >= 9.0),
                    // one bookmark-floor reject, one R18 reject
                    let accepted = item_json(10, 1000, 10000, 6);
                    let low_bookmarks = item_json(11, 200, 2000, 6);
                    let r18 = serde_json::json!({
                        "id": 12,
                        "title": "late night",
                        "type": "illust",
                        "user": { "id": 5, "name": "yoru" },
                        "tags": [{ "name": "R-18" }],
                        "create_date": (Utc::now() - Duration::hours(6)).to_rfc3339(),
                        "page_count": 1,
                        "total_bookmarks": 5000,
                        "total_view": 20000,
                    });
                    Json(listing_json(vec![accepted, low_bookmarks, r18], None)).into_response()
                }
                _ => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
            }
        }),
    );
    let base_url = spawn_upstream(upstream).await;

    let outcome = run_mode(
        &pool,
        &base_url,
        CollectMode::CustomRanking {
            keywords: vec!["landscape".to_string(), "broken".to_string()],
        },
    )
    .await;

    // First keyword's acceptance persisted despite the second keyword dying
    assert_eq!(outcome.status, LogStatus::Partial);
    assert_eq!(artworks::count(&pool).await.unwrap(), 1);

    let accepted = artworks::get_by_external_id(&pool, 10).await.unwrap().unwrap();
    assert_eq!(accepted.collected_via, LogType::CustomRanking);
    assert!(artworks::get_by_external_id(&pool, 11).await.unwrap().is_none());
    assert!(artworks::get_by_external_id(&pool, 12).await.unwrap().is_none());
}

#[tokio::test]
async fn keyword_walk_stops_when_page_exceeds_age_window() {
    let pool = test_pool().await;
    fast_settings(&pool).await;

    // Page 1 carries an item older than 72h; the walk must not follow the
    // continuation (its page would fail the run).
    let upstream = Router::new().route(
        "/v1/search/illust",
        get(|Query(params): Query<HashMap<String, String>>| async move {
            match offset_of(&params) {
                0 => Json(listing_json(
                    vec![item_json(20, 1000, 10000, 6), item_json(21, 400, 4000, 100)],
                    Some(30),
                ))
                .into_response(),
                _ => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
            }
        }),
    );
    let base_url = spawn_upstream(upstream).await;

    let outcome = run_mode(
        &pool,
        &base_url,
        CollectMode::CustomRanking {
            keywords: vec!["retro".to_string()],
        },
    )
    .await;

    assert_eq!(outcome.status, LogStatus::Succeeded);
    assert!(artworks::get_by_external_id(&pool, 20).await.unwrap().is_some());
}

#[tokio::test]
async fn keyword_walk_stops_once_accept_cap_is_exceeded() {
    let pool = test_pool().await;
    fast_settings(&pool).await;
    galleria_common::db::set_setting(&pool, "search_accept_cap", 2)
        .await
        .unwrap();

    // Every page yields three clear accepts; page 2 would fail the run if
    // the cap did not end the walk after page 1.
    let upstream = Router::new().route(
        "/v1/search/illust",
        get(|Query(params): Query<HashMap<String, String>>| async move {
            match offset_of(&params) {
                0 => Json(listing_json(
                    vec![
                        item_json(30, 1000, 10000, 6),
                        item_json(31, 1000, 10000, 6),
                        item_json(32, 1000, 10000, 6),
                    ],
                    Some(30),
                ))
                .into_response(),
                _ => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
            }
        }),
    );
    let base_url = spawn_upstream(upstream).await;

    let outcome = run_mode(
        &pool,
        &base_url,
        CollectMode::CustomRanking {
            keywords: vec!["popular".to_string()],
        },
    )
    .await;

    assert_eq!(outcome.status, LogStatus::Succeeded);
    // Everything accepted on the capping page is still persisted
    assert_eq!(artworks::count(&pool).await.unwrap(), 3);
}

#[tokio::test]
async fn metadata_update_refreshes_metrics_and_marks_removed_works() {
    let pool = test_pool().await;
    fast_settings(&pool).await;

    // Seed two aging artworks
    for id in [300i64, 301] {
        let item: galleria_collect::upstream::ArtworkItem =
            serde_json::from_value(item_json(id, 100, 1000, 24 * 60)).unwrap();
        let mut artwork = galleria_collect::models::Artwork::from_item(
            &item,
            LogType::RankingWorks,
            Utc::now(),
        );
        artwork.refreshed_at = Utc::now() - Duration::days(40);
        artworks::insert_if_absent(&pool, &artwork).await.unwrap();
    }

    let upstream = Router::new().route(
        "/v1/illust/detail",
        get(|Query(params): Query<HashMap<String, String>>| async move {
            match params.get("illust_id").map(String::as_str) {
                Some("300") => StatusCode::NOT_FOUND.into_response(),
                Some("301") => Json(serde_json::json!({
                    "illust": item_json(301, 2500, 30000, 24 * 60)
                }))
                .into_response(),
                _ => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
            }
        }),
    );
    let base_url = spawn_upstream(upstream).await;

    let outcome = run_mode(&pool, &base_url, CollectMode::MetadataUpdate).await;
    assert_eq!(outcome.status, LogStatus::Succeeded);

    // 300 is gone upstream: marked stale under the default policy
    let gone = artworks::get_by_external_id(&pool, 300).await.unwrap().unwrap();
    assert!(gone.is_stale);

    // 301 got fresh metrics
    let refreshed = artworks::get_by_external_id(&pool, 301).await.unwrap().unwrap();
    assert_eq!(refreshed.total_bookmarks, 2500);
    assert_eq!(refreshed.total_view, 30000);
    assert!(refreshed.refreshed_at > Utc::now() - Duration::minutes(5));
}

#[tokio::test]
async fn metadata_update_delete_policy_removes_rows() {
    let pool = test_pool().await;
    fast_settings(&pool).await;
    galleria_common::db::set_setting(&pool, "invalid_artwork_action", "delete")
        .await
        .unwrap();

    let item: galleria_collect::upstream::ArtworkItem =
        serde_json::from_value(item_json(302, 100, 1000, 24 * 60)).unwrap();
    let mut artwork =
        galleria_collect::models::Artwork::from_item(&item, LogType::RankingWorks, Utc::now());
    artwork.refreshed_at = Utc::now() - Duration::days(40);
    artworks::insert_if_absent(&pool, &artwork).await.unwrap();

    let upstream = Router::new().route(
        "/v1/illust/detail",
        get(|| async { StatusCode::NOT_FOUND.into_response() }),
    );
    let base_url = spawn_upstream(upstream).await;

    let outcome = run_mode(&pool, &base_url, CollectMode::MetadataUpdate).await;
    assert_eq!(outcome.status, LogStatus::Succeeded);
    assert!(artworks::get_by_external_id(&pool, 302).await.unwrap().is_none());
}

#[tokio::test]
async fn follow_sync_registers_new_users_until_a_known_one() {
    let pool = test_pool().await;
    fast_settings(&pool).await;

    // User 30 is already known; the newest-first listing stops there
    followed_users::insert_if_absent(&pool, &FollowedUser::new(30, "old friend"))
        .await
        .unwrap();

    let upstream = Router::new().route(
        "/v1/user/following",
        get(|| async {
            Json(serde_json::json!({
                "user_previews": [
                    { "user": { "id": 10, "name": "first" } },
                    { "user": { "id": 20, "name": "second" } },
                    { "user": { "id": 30, "name": "old friend" } },
                    { "user": { "id": 40, "name": "never reached" } },
                ],
                "next_url": "http://upstream.test/page?offset=30",
            }))
        }),
    );
    let base_url = spawn_upstream(upstream).await;

    let outcome = run_mode(&pool, &base_url, CollectMode::FollowSync).await;
    assert_eq!(outcome.status, LogStatus::Succeeded);
    assert!(outcome.message.contains("2 new follows"));

    assert_eq!(followed_users::count(&pool).await.unwrap(), 3);
    assert!(followed_users::get(&pool, 40).await.unwrap().is_none());
}

#[tokio::test]
async fn initial_backfill_stops_at_backtrack_window_and_completes_user() {
    let pool = test_pool().await;
    fast_settings(&pool).await;

    followed_users::insert_if_absent(&pool, &FollowedUser::new(88, "kumo"))
        .await
        .unwrap();

    // One recent work, one outside the two-year backtrack window; the
    // continuation would 500 if the walk failed to stop at the cutoff.
    let upstream = Router::new().route(
        "/v1/user/illusts",
        get(|Query(params): Query<HashMap<String, String>>| async move {
            match offset_of(&params) {
                0 => Json(listing_json(
                    vec![
                        item_json(600, 400, 4000, 24),
                        item_json(601, 400, 4000, 24 * 365 * 3),
                    ],
                    Some(30),
                ))
                .into_response(),
                _ => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
            }
        }),
    );
    let base_url = spawn_upstream(upstream).await;

    let outcome = run_mode(&pool, &base_url, CollectMode::InitialBackfill).await;
    assert_eq!(outcome.status, LogStatus::Succeeded);
    assert_eq!(outcome.artworks_count, 1);

    assert!(artworks::get_by_external_id(&pool, 600).await.unwrap().is_some());
    assert!(artworks::get_by_external_id(&pool, 601).await.unwrap().is_none());

    let user = followed_users::get(&pool, 88).await.unwrap().unwrap();
    assert!(user.backfill_completed);
    assert!(user.last_synced_at.is_some());
}

#[tokio::test]
async fn follow_new_works_backfills_new_authors_and_stops_at_known_work() {
    let pool = test_pool().await;
    fast_settings(&pool).await;

    let upstream = Router::new()
        .route(
            "/v2/illust/follow",
            get(|| async {
                // One feed item from author 77, unknown on first run
                let mut item = item_json(400, 400, 4000, 12);
                item["user"] = serde_json::json!({ "id": 77, "name": "atari" });
                Json(listing_json(vec![item], None))
            }),
        )
        .route(
            "/v1/user/illusts",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                assert_eq!(params.get("user_id").map(String::as_str), Some("77"));
                let mut item = item_json(500, 300, 3000, 24 * 30);
                item["user"] = serde_json::json!({ "id": 77, "name": "atari" });
                Json(listing_json(vec![item], None))
            }),
        );
    let base_url = spawn_upstream(upstream).await;

    let outcome = run_mode(&pool, &base_url, CollectMode::FollowNewWorks).await;
    assert_eq!(outcome.status, LogStatus::Succeeded);
    assert!(outcome.message.contains("found 1 new users"));

    // Feed item + backlogged history item
    assert!(artworks::get_by_external_id(&pool, 400).await.unwrap().is_some());
    assert!(artworks::get_by_external_id(&pool, 500).await.unwrap().is_some());

    let user = followed_users::get(&pool, 77).await.unwrap().unwrap();
    assert!(user.backfill_completed);

    // Second run hits artwork 400 (collected via follow) and stops with
    // nothing new.
    let outcome = run_mode(&pool, &base_url, CollectMode::FollowNewWorks).await;
    assert_eq!(outcome.status, LogStatus::Succeeded);
    assert_eq!(outcome.artworks_count, 0);
    assert_eq!(artworks::count(&pool).await.unwrap(), 2);
}

#[tokio::test]
async fn cancelled_run_terminates_partial() {
    let pool = test_pool().await;
    fast_settings(&pool).await;

    let upstream = Router::new().route(
        "/v1/illust/ranking",
        get(|| async { Json(listing_json(vec![item_json(1, 500, 5000, 48)], None)) }),
    );
    let base_url = spawn_upstream(upstream).await;

    let client = test_client(&pool, &base_url);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let orchestrator =
        CollectionOrchestrator::new(pool.clone(), client, EventBus::new(64), cancel);
    let outcome = orchestrator
        .run(CollectMode::RankingWorks {
            period: RankingPeriod::Day,
            pages: None,
        })
        .await;

    assert_eq!(outcome.status, LogStatus::Partial);
    assert_eq!(outcome.artworks_count, 0);
    assert_eq!(artworks::count(&pool).await.unwrap(), 0);
}

#[tokio::test]
async fn log_cleanup_deletes_old_runs() {
    let pool = test_pool().await;
    fast_settings(&pool).await;

    let mut old = galleria_collect::models::CollectionLog::new(LogType::RankingWorks, "ancient");
    old.started_at = Utc::now() - Duration::days(120);
    collection_logs::save_log(&pool, &old).await.unwrap();

    // Upstream never called for cleanup; any router works
    let base_url = spawn_upstream(Router::new()).await;

    let outcome = run_mode(&pool, &base_url, CollectMode::LogCleanup).await;
    assert_eq!(outcome.status, LogStatus::Succeeded);
    assert_eq!(outcome.artworks_count, 1);
    assert!(collection_logs::load_log(&pool, old.id).await.unwrap().is_none());
}
