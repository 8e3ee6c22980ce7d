//! Followed user record
//!
//! Created and updated by the follow-sync mode; read by the followed-new-works
//! and initial-backfill modes. Users who unfollow are kept.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowedUser {
    /// Platform-side user identifier, unique per row
    pub external_id: i64,
    pub name: String,
    /// Last time a collection mode pulled this user's works
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Historical backfill finished for this user
    pub backfill_completed: bool,
    pub created_at: DateTime<Utc>,
}

impl FollowedUser {
    pub fn new(external_id: i64, name: impl Into<String>) -> Self {
        Self {
            external_id,
            name: name.into(),
            last_synced_at: None,
            backfill_completed: false,
            created_at: Utc::now(),
        }
    }
}
