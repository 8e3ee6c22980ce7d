//! Collection API handlers
//!
//! One submission endpoint per collection mode, each returning 202 with a
//! task id, plus the poll endpoint, best-effort cancellation, and a paged
//! collection-log listing.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::collector::CollectMode;
use crate::error::{ApiError, ApiResult};
use crate::models::{CollectionLog, LogStatus, LogType};
use crate::tasks::{SubmitError, TaskStatus};
use crate::upstream::RankingPeriod;
use crate::AppState;

/// Task submission response (202)
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub success: bool,
    pub task_id: Uuid,
    pub message: String,
}

/// Log snapshot embedded in status responses
#[derive(Debug, Serialize)]
pub struct LogSnapshot {
    pub id: Uuid,
    pub log_type: LogType,
    pub status: LogStatus,
    pub message: String,
    pub artworks_count: u32,
}

impl From<CollectionLog> for LogSnapshot {
    fn from(log: CollectionLog) -> Self {
        Self {
            id: log.id,
            log_type: log.log_type,
            status: log.status,
            message: log.message,
            artworks_count: log.artworks_count,
        }
    }
}

/// GET /api/collect/task/{task_id} response
#[derive(Debug, Serialize)]
pub struct TaskStatusResponse {
    pub success: bool,
    pub task_id: Uuid,
    pub status: TaskStatus,
    pub result: Option<serde_json::Value>,
    pub metadata: serde_json::Value,
    pub log: Option<LogSnapshot>,
}

/// POST /api/collect/ranking request
#[derive(Debug, Deserialize)]
pub struct RankingRequest {
    pub period: RankingPeriod,
    #[serde(default)]
    pub pages: Option<u32>,
}

/// POST /api/collect/custom-ranking request
#[derive(Debug, Deserialize)]
pub struct CustomRankingRequest {
    pub keywords: Vec<String>,
}

/// GET /api/collect/logs query parameters
#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    #[serde(rename = "type")]
    pub log_type: Option<String>,
    pub status: Option<String>,
}

fn default_page() -> u32 {
    1
}

fn default_per_page() -> u32 {
    20
}

/// GET /api/collect/logs response
#[derive(Debug, Serialize)]
pub struct LogsResponse {
    pub success: bool,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
    pub logs: Vec<CollectionLog>,
}

async fn submit(state: &AppState, mode: CollectMode, message: &str) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    match state.tasks.submit(mode).await {
        Ok(task_id) => Ok((
            StatusCode::ACCEPTED,
            Json(SubmitResponse {
                success: true,
                task_id,
                message: message.to_string(),
            }),
        )),
        Err(SubmitError::AlreadyRunning { .. } ) => Err(ApiError::Conflict(
            "A collection task is already running for this target".to_string(),
        )),
    }
}

/// POST /api/collect/ranking
///
/// Begin ranking collection. Returns 202 Accepted with the task id.
pub async fn collect_ranking(
    State(state): State<AppState>,
    Json(request): Json<RankingRequest>,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    submit(
        &state,
        CollectMode::RankingWorks {
            period: request.period,
            pages: request.pages,
        },
        "Ranking collection task submitted",
    )
    .await
}

/// POST /api/collect/sync-follows
pub async fn sync_follows(
    State(state): State<AppState>,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    submit(&state, CollectMode::FollowSync, "Follow sync task submitted").await
}

/// POST /api/collect/follow-new-works
pub async fn collect_follow_new_works(
    State(state): State<AppState>,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    submit(
        &state,
        CollectMode::FollowNewWorks,
        "Follow new works collection task submitted",
    )
    .await
}

/// POST /api/collect/backfill
pub async fn initial_backfill(
    State(state): State<AppState>,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    submit(
        &state,
        CollectMode::InitialBackfill,
        "Initial backfill task submitted",
    )
    .await
}

/// POST /api/collect/custom-ranking
pub async fn custom_ranking(
    State(state): State<AppState>,
    Json(request): Json<CustomRankingRequest>,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    if request.keywords.is_empty() {
        return Err(ApiError::BadRequest("keywords must not be empty".to_string()));
    }
    submit(
        &state,
        CollectMode::CustomRanking {
            keywords: request.keywords,
        },
        "Custom ranking collection task submitted",
    )
    .await
}

/// POST /api/collect/update-artworks
pub async fn update_artworks(
    State(state): State<AppState>,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    submit(
        &state,
        CollectMode::MetadataUpdate,
        "Artwork metadata update task submitted",
    )
    .await
}

/// POST /api/collect/cleanup-logs
pub async fn cleanup_logs(
    State(state): State<AppState>,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    submit(&state, CollectMode::LogCleanup, "Log cleanup task submitted").await
}

/// GET /api/collect/task/{task_id}
///
/// Poll task progress. Idempotent; expired and unknown tasks return 404.
pub async fn get_task_status(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<TaskStatusResponse>> {
    let record = state
        .tasks
        .get_status(task_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Task not found: {}", task_id)))?;

    let log = match record.log_id {
        Some(log_id) => crate::db::collection_logs::load_log(&state.db, log_id)
            .await?
            .map(LogSnapshot::from),
        None => None,
    };

    tracing::debug!(%task_id, status = ?record.status, "Task status query");

    Ok(Json(TaskStatusResponse {
        success: true,
        task_id,
        status: record.status,
        result: record.result.clone(),
        metadata: serde_json::json!({
            "mode": record.mode,
            "target_key": record.target_key,
            "submitted_at": record.submitted_at,
            "finished_at": record.finished_at,
        }),
        log,
    }))
}

/// POST /api/collect/task/{task_id}/cancel
///
/// Best-effort cancellation: the run stops at its next page boundary and
/// terminates partial.
pub async fn cancel_task(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    if state.tasks.cancel(task_id).await {
        Ok(Json(serde_json::json!({
            "success": true,
            "task_id": task_id,
            "message": "Cancellation requested",
        })))
    } else {
        Err(ApiError::NotFound(format!(
            "No cancellable task: {}",
            task_id
        )))
    }
}

/// GET /api/collect/logs
///
/// Paged collection log listing with optional type/status filters.
pub async fn get_collect_logs(
    State(state): State<AppState>,
    Query(query): Query<LogsQuery>,
) -> ApiResult<Json<LogsResponse>> {
    let per_page = query.per_page.clamp(1, 100);
    let page = query.page.max(1);

    let log_type = query
        .log_type
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<LogType>()
                .map_err(ApiError::BadRequest)
        })
        .transpose()?;
    let status = query
        .status
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<LogStatus>()
                .map_err(ApiError::BadRequest)
        })
        .transpose()?;

    let (logs, total) =
        crate::db::collection_logs::list_page(&state.db, page, per_page, log_type, status).await?;

    Ok(Json(LogsResponse {
        success: true,
        total,
        page,
        per_page,
        logs,
    }))
}

/// Build collection API routes
pub fn collect_routes() -> Router<AppState> {
    Router::new()
        .route("/api/collect/ranking", post(collect_ranking))
        .route("/api/collect/sync-follows", post(sync_follows))
        .route("/api/collect/follow-new-works", post(collect_follow_new_works))
        .route("/api/collect/backfill", post(initial_backfill))
        .route("/api/collect/custom-ranking", post(custom_ranking))
        .route("/api/collect/update-artworks", post(update_artworks))
        .route("/api/collect/cleanup-logs", post(cleanup_logs))
        .route("/api/collect/task/:task_id", get(get_task_status))
        .route("/api/collect/task/:task_id/cancel", post(cancel_task))
        .route("/api/collect/logs", get(get_collect_logs))
}
