//! Collection run log
//!
//! One row per collection run. Created when the run enters the orchestrator,
//! mutated in place while the run progresses, immutable once terminal.
//! Status moves strictly forward: pending → running → one of
//! succeeded / partial / failed. A backward transition is a bug in the
//! caller; the model refuses it rather than corrupting the record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What kind of collection a log row belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogType {
    RankingWorks,
    FollowSync,
    FollowNewWorks,
    InitialBackfill,
    CustomRanking,
    MetadataUpdate,
    LogCleanup,
}

impl LogType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogType::RankingWorks => "ranking_works",
            LogType::FollowSync => "follow_sync",
            LogType::FollowNewWorks => "follow_new_works",
            LogType::InitialBackfill => "initial_backfill",
            LogType::CustomRanking => "custom_ranking",
            LogType::MetadataUpdate => "metadata_update",
            LogType::LogCleanup => "log_cleanup",
        }
    }
}

impl std::str::FromStr for LogType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ranking_works" => Ok(LogType::RankingWorks),
            "follow_sync" => Ok(LogType::FollowSync),
            "follow_new_works" => Ok(LogType::FollowNewWorks),
            "initial_backfill" => Ok(LogType::InitialBackfill),
            "custom_ranking" => Ok(LogType::CustomRanking),
            "metadata_update" => Ok(LogType::MetadataUpdate),
            "log_cleanup" => Ok(LogType::LogCleanup),
            other => Err(format!("unknown log type: {}", other)),
        }
    }
}

/// Run status, forward-only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStatus {
    Pending,
    Running,
    Succeeded,
    Partial,
    Failed,
}

impl LogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogStatus::Pending => "pending",
            LogStatus::Running => "running",
            LogStatus::Succeeded => "succeeded",
            LogStatus::Partial => "partial",
            LogStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LogStatus::Succeeded | LogStatus::Partial | LogStatus::Failed)
    }

    /// Position in the forward-only ordering
    fn rank(&self) -> u8 {
        match self {
            LogStatus::Pending => 0,
            LogStatus::Running => 1,
            LogStatus::Succeeded | LogStatus::Partial | LogStatus::Failed => 2,
        }
    }
}

impl std::str::FromStr for LogStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(LogStatus::Pending),
            "running" => Ok(LogStatus::Running),
            "succeeded" => Ok(LogStatus::Succeeded),
            "partial" => Ok(LogStatus::Partial),
            "failed" => Ok(LogStatus::Failed),
            other => Err(format!("unknown log status: {}", other)),
        }
    }
}

/// One collection run's log record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionLog {
    pub id: Uuid,
    pub log_type: LogType,
    pub status: LogStatus,
    pub message: String,
    pub artworks_count: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl CollectionLog {
    pub fn new(log_type: LogType, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            log_type,
            status: LogStatus::Pending,
            message: message.into(),
            artworks_count: 0,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Advance to a new status.
    ///
    /// Returns false (and leaves the record untouched) when the transition
    /// would move backward or re-enter a terminal state.
    pub fn transition_to(&mut self, new_status: LogStatus) -> bool {
        if self.status.is_terminal() {
            tracing::warn!(
                log_id = %self.id,
                current = self.status.as_str(),
                requested = new_status.as_str(),
                "Refusing status transition out of terminal state"
            );
            return false;
        }
        if new_status.rank() <= self.status.rank() {
            tracing::warn!(
                log_id = %self.id,
                current = self.status.as_str(),
                requested = new_status.as_str(),
                "Refusing backward status transition"
            );
            return false;
        }

        self.status = new_status;
        if new_status.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        true
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_log_is_pending_and_open() {
        let log = CollectionLog::new(LogType::RankingWorks, "starting");
        assert_eq!(log.status, LogStatus::Pending);
        assert!(log.finished_at.is_none());
        assert_eq!(log.artworks_count, 0);
    }

    #[test]
    fn forward_transitions_apply() {
        let mut log = CollectionLog::new(LogType::CustomRanking, "starting");
        assert!(log.transition_to(LogStatus::Running));
        assert!(log.transition_to(LogStatus::Succeeded));
        assert_eq!(log.status, LogStatus::Succeeded);
        assert!(log.finished_at.is_some());
    }

    #[test]
    fn backward_transitions_are_refused() {
        let mut log = CollectionLog::new(LogType::FollowSync, "starting");
        log.transition_to(LogStatus::Running);

        assert!(!log.transition_to(LogStatus::Pending));
        assert_eq!(log.status, LogStatus::Running);

        log.transition_to(LogStatus::Succeeded);
        assert!(!log.transition_to(LogStatus::Running));
        assert!(!log.transition_to(LogStatus::Failed));
        assert_eq!(log.status, LogStatus::Succeeded);
    }

    #[test]
    fn pending_can_fail_directly() {
        // A run that dies before doing any work still terminates cleanly.
        let mut log = CollectionLog::new(LogType::MetadataUpdate, "starting");
        assert!(log.transition_to(LogStatus::Failed));
        assert!(log.is_terminal());
    }

    #[test]
    fn status_strings_round_trip() {
        for status in [
            LogStatus::Pending,
            LogStatus::Running,
            LogStatus::Succeeded,
            LogStatus::Partial,
            LogStatus::Failed,
        ] {
            let parsed: LogStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn log_type_strings_round_trip() {
        for log_type in [
            LogType::RankingWorks,
            LogType::FollowSync,
            LogType::FollowNewWorks,
            LogType::InitialBackfill,
            LogType::CustomRanking,
            LogType::MetadataUpdate,
            LogType::LogCleanup,
        ] {
            let parsed: LogType = log_type.as_str().parse().unwrap();
            assert_eq!(parsed, log_type);
        }
    }
}
