//! Background task bridge
//!
//! Wraps one orchestrator invocation as a unit of asynchronous work:
//! `submit` returns a task id immediately and the run executes on a small
//! worker pool; `get_status` is an idempotent poll against an in-memory
//! record that expires after a retention window. At most one run may be in
//! flight per target key — a duplicate submission fails fast instead of
//! queuing a conflicting run.

use crate::collector::{CollectMode, CollectionOrchestrator, RunOutcome};
use crate::models::LogStatus;
use crate::upstream::ApiClient;
use chrono::{DateTime, Utc};
use galleria_common::events::{CollectEvent, EventBus};
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// Task lifecycle, as seen by pollers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Accepted, waiting for a worker
    Pending,
    /// Executing on a worker
    Running,
    /// Run finished (the run outcome may still be partial)
    Completed,
    /// Run finished in a failed state
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// Poll-able record of one submitted task
#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    pub task_id: Uuid,
    /// Log type label of the submitted mode
    pub mode: String,
    pub target_key: String,
    pub status: TaskStatus,
    /// Run outcome summary once terminal
    pub result: Option<serde_json::Value>,
    /// Collection log backing this run, once it started
    pub log_id: Option<Uuid>,
    pub submitted_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    cancel: CancellationToken,
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("A {mode} task is already running for target '{target_key}'")]
    AlreadyRunning { mode: String, target_key: String },
}

struct TaskState {
    records: HashMap<Uuid, TaskRecord>,
    /// target key → task id of the in-flight run
    in_flight: HashMap<String, Uuid>,
}

struct Inner {
    db: SqlitePool,
    client: Arc<ApiClient>,
    events: EventBus,
    state: Mutex<TaskState>,
    workers: Arc<Semaphore>,
    retention: Duration,
}

/// Submission and polling facade over the worker pool
#[derive(Clone)]
pub struct TaskRunner {
    inner: Arc<Inner>,
}

impl TaskRunner {
    pub fn new(
        db: SqlitePool,
        client: Arc<ApiClient>,
        events: EventBus,
        worker_count: usize,
        retention: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                db,
                client,
                events,
                state: Mutex::new(TaskState {
                    records: HashMap::new(),
                    in_flight: HashMap::new(),
                }),
                workers: Arc::new(Semaphore::new(worker_count.max(1))),
                retention,
            }),
        }
    }

    /// Submit a collection mode for background execution.
    ///
    /// Returns immediately with the task id, or fails fast when the same
    /// target already has a run in flight.
    pub async fn submit(&self, mode: CollectMode) -> Result<Uuid, SubmitError> {
        let target_key = mode.target_key();
        let mode_label = mode.log_type().as_str().to_string();
        let task_id = Uuid::new_v4();
        let cancel = CancellationToken::new();

        {
            let mut state = self.inner.state.lock().await;
            state.prune(self.inner.retention);

            if state.in_flight.contains_key(&target_key) {
                return Err(SubmitError::AlreadyRunning {
                    mode: mode_label,
                    target_key,
                });
            }

            state.records.insert(
                task_id,
                TaskRecord {
                    task_id,
                    mode: mode_label.clone(),
                    target_key: target_key.clone(),
                    status: TaskStatus::Pending,
                    result: None,
                    log_id: None,
                    submitted_at: Utc::now(),
                    finished_at: None,
                    cancel: cancel.clone(),
                },
            );
            state.in_flight.insert(target_key.clone(), task_id);
        }

        info!(
            %task_id,
            mode = %mode_label,
            target_key = %target_key,
            "Collection task submitted"
        );

        let runner = self.clone();
        tokio::spawn(async move {
            runner.execute(task_id, mode, target_key, cancel).await;
        });

        Ok(task_id)
    }

    /// Poll a task's status. Safe to call repeatedly; `None` for unknown or
    /// expired tasks.
    pub async fn get_status(&self, task_id: Uuid) -> Option<TaskRecord> {
        let mut state = self.inner.state.lock().await;
        state.prune(self.inner.retention);
        state.records.get(&task_id).cloned()
    }

    /// Request best-effort cancellation. The run stops at its next page
    /// boundary and terminates partial. Returns false for unknown or
    /// already-terminal tasks.
    pub async fn cancel(&self, task_id: Uuid) -> bool {
        let state = self.inner.state.lock().await;
        match state.records.get(&task_id) {
            Some(record) if !record.status.is_terminal() => {
                info!(%task_id, "Cancellation requested");
                record.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    async fn execute(
        &self,
        task_id: Uuid,
        mode: CollectMode,
        target_key: String,
        cancel: CancellationToken,
    ) {
        let permit = match self.inner.workers.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                warn!(%task_id, "Worker pool closed before task could start");
                self.finish(task_id, &target_key, None).await;
                return;
            }
        };

        {
            let mut state = self.inner.state.lock().await;
            if let Some(record) = state.records.get_mut(&task_id) {
                record.status = TaskStatus::Running;
            }
        }
        self.inner.events.emit(CollectEvent::TaskStarted {
            task_id,
            log_type: mode.log_type().as_str().to_string(),
            timestamp: Utc::now(),
        });

        let orchestrator = CollectionOrchestrator::new(
            self.inner.db.clone(),
            self.inner.client.clone(),
            self.inner.events.clone(),
            cancel,
        );
        let outcome = orchestrator.run(mode).await;

        self.inner.events.emit(CollectEvent::TaskFinished {
            task_id,
            log_id: outcome.log_id,
            status: outcome.status.as_str().to_string(),
            message: outcome.message.clone(),
            timestamp: Utc::now(),
        });

        self.finish(task_id, &target_key, Some(outcome)).await;
        drop(permit);
    }

    async fn finish(&self, task_id: Uuid, target_key: &str, outcome: Option<RunOutcome>) {
        let mut state = self.inner.state.lock().await;
        state.in_flight.remove(target_key);

        if let Some(record) = state.records.get_mut(&task_id) {
            record.finished_at = Some(Utc::now());
            match outcome {
                Some(outcome) => {
                    record.status = if outcome.status == LogStatus::Failed {
                        TaskStatus::Failed
                    } else {
                        TaskStatus::Completed
                    };
                    record.log_id = Some(outcome.log_id);
                    record.result = Some(serde_json::json!({
                        "success": outcome.status != LogStatus::Failed,
                        "status": outcome.status.as_str(),
                        "artworks_count": outcome.artworks_count,
                        "message": outcome.message,
                    }));
                }
                None => {
                    record.status = TaskStatus::Failed;
                    record.result = Some(serde_json::json!({
                        "success": false,
                        "message": "Worker pool unavailable",
                    }));
                }
            }
        }
    }
}

impl TaskState {
    /// Drop terminal records older than the retention window
    fn prune(&mut self, retention: Duration) {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(retention).unwrap_or_else(|_| chrono::Duration::hours(1));
        self.records.retain(|_, record| {
            match (record.status.is_terminal(), record.finished_at) {
                (true, Some(finished)) => finished > cutoff,
                _ => true,
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_and_running_are_not_terminal() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
    }

    #[test]
    fn prune_keeps_fresh_and_unfinished_records() {
        let cancel = CancellationToken::new();
        let mut state = TaskState {
            records: HashMap::new(),
            in_flight: HashMap::new(),
        };

        let fresh = Uuid::new_v4();
        state.records.insert(
            fresh,
            TaskRecord {
                task_id: fresh,
                mode: "ranking_works".to_string(),
                target_key: "ranking_works:day".to_string(),
                status: TaskStatus::Completed,
                result: None,
                log_id: None,
                submitted_at: Utc::now(),
                finished_at: Some(Utc::now()),
                cancel: cancel.clone(),
            },
        );

        let stale = Uuid::new_v4();
        state.records.insert(
            stale,
            TaskRecord {
                task_id: stale,
                mode: "follow_sync".to_string(),
                target_key: "follow_sync".to_string(),
                status: TaskStatus::Completed,
                result: None,
                log_id: None,
                submitted_at: Utc::now() - chrono::Duration::hours(3),
                finished_at: Some(Utc::now() - chrono::Duration::hours(2)),
                cancel: cancel.clone(),
            },
        );

        let running = Uuid::new_v4();
        state.records.insert(
            running,
            TaskRecord {
                task_id: running,
                mode: "metadata_update".to_string(),
                target_key: "metadata_update".to_string(),
                status: TaskStatus::Running,
                result: None,
                log_id: None,
                submitted_at: Utc::now() - chrono::Duration::hours(5),
                finished_at: None,
                cancel,
            },
        );

        state.prune(Duration::from_secs(3600));

        assert!(state.records.contains_key(&fresh));
        assert!(!state.records.contains_key(&stale));
        // An unfinished record never expires, however old
        assert!(state.records.contains_key(&running));
    }
}
