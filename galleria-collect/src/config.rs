//! Runtime configuration resolution
//!
//! Every tunable lives in the settings table and is re-read at the start of
//! each collection run, so edits take effect on the next run without a
//! restart. Defaults apply when a key is absent.

use crate::collector::{BackoffWindow, RetryConfig, ScoringConfig, ThrottleConfig};
use galleria_common::db::get_setting_or;
use galleria_common::Result;
use sqlx::SqlitePool;

/// What to do with an artwork the upstream no longer serves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidArtworkAction {
    /// Flag the row stale, keep the data
    Mark,
    /// Remove the row
    Delete,
}

impl std::str::FromStr for InvalidArtworkAction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "mark" => Ok(InvalidArtworkAction::Mark),
            "delete" => Ok(InvalidArtworkAction::Delete),
            other => Err(format!("unknown invalid_artwork_action: {}", other)),
        }
    }
}

/// All tunables one collection run needs, loaded together
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub throttle: ThrottleConfig,
    pub retry: RetryConfig,
    pub scoring: ScoringConfig,
    /// Ranking mode: pages of the listing to pull
    pub ranking_pages: u32,
    /// Backfill: how far into a user's history to walk
    pub backtrack_years: u32,
    /// Metadata refresh: re-fetch works not refreshed within this many days
    pub update_interval_days: u32,
    /// Metadata refresh: ceiling per run
    pub update_max_per_run: u32,
    pub invalid_artwork_action: InvalidArtworkAction,
    /// Log cleanup: delete collection logs older than this many days
    pub log_retention_days: u32,
    /// Task bridge: drop finished task records after this many seconds
    pub task_retention_secs: u64,
    /// Task bridge: concurrent collection runs
    pub worker_count: usize,
}

impl CollectorConfig {
    /// Read every tunable from the settings table, falling back to defaults
    pub async fn load(pool: &SqlitePool) -> Result<Self> {
        let throttle = ThrottleConfig {
            delay_min: get_setting_or(pool, "api_delay_min", 1.0).await?,
            delay_max: get_setting_or(pool, "api_delay_max", 10.0).await?,
            batch_size: get_setting_or(pool, "api_batch_size", 5).await?,
            batch_pause_min: get_setting_or(pool, "api_batch_pause_min", 5.0).await?,
            batch_pause_max: get_setting_or(pool, "api_batch_pause_max", 15.0).await?,
        };

        let retry = RetryConfig {
            rate_limited: BackoffWindow {
                min: get_setting_or(pool, "error_delay_429_min", 30.0).await?,
                max: get_setting_or(pool, "error_delay_429_max", 60.0).await?,
            },
            forbidden: BackoffWindow {
                min: get_setting_or(pool, "error_delay_403_min", 60.0).await?,
                max: get_setting_or(pool, "error_delay_403_max", 120.0).await?,
            },
            transient: BackoffWindow {
                min: get_setting_or(pool, "error_delay_other_min", 10.0).await?,
                max: get_setting_or(pool, "error_delay_other_max", 20.0).await?,
            },
            max_attempts: get_setting_or(pool, "fetch_max_attempts", 3).await?,
            forbidden_max_attempts: get_setting_or(pool, "forbidden_max_attempts", 2).await?,
        };

        let scoring = ScoringConfig {
            min_age_hours: get_setting_or(pool, "score_min_age_hours", 3.0).await?,
            min_bookmarks: get_setting_or(pool, "score_min_bookmarks", 300).await?,
            max_page_count: get_setting_or(pool, "score_max_page_count", 5).await?,
            ai_fresh_multiplier: get_setting_or(pool, "score_ai_fresh_multiplier", 0.45).await?,
            ai_aged_multiplier: get_setting_or(pool, "score_ai_aged_multiplier", 0.65).await?,
            fresh_threshold: get_setting_or(pool, "score_fresh_threshold", 9.0).await?,
            aged_threshold: get_setting_or(pool, "score_aged_threshold", 3.2).await?,
            fresh_window_hours: get_setting_or(pool, "score_fresh_window_hours", 24.0).await?,
            max_offset: get_setting_or(pool, "search_max_offset", 3000).await?,
            max_item_age_hours: get_setting_or(pool, "search_max_age_hours", 72.0).await?,
            keyword_accept_cap: get_setting_or(pool, "search_accept_cap", 50).await?,
        };

        let invalid_artwork_action: String =
            get_setting_or(pool, "invalid_artwork_action", "mark".to_string()).await?;
        let invalid_artwork_action = invalid_artwork_action
            .parse()
            .map_err(galleria_common::Error::Config)?;

        Ok(Self {
            throttle,
            retry,
            scoring,
            ranking_pages: get_setting_or(pool, "ranking_pages", 5).await?,
            backtrack_years: get_setting_or(pool, "new_user_backtrack_years", 2).await?,
            update_interval_days: get_setting_or(pool, "update_interval_days", 30).await?,
            update_max_per_run: get_setting_or(pool, "update_max_per_run", 200).await?,
            invalid_artwork_action,
            log_retention_days: get_setting_or(pool, "log_retention_days", 90).await?,
            task_retention_secs: get_setting_or(pool, "task_retention_secs", 3600).await?,
            worker_count: get_setting_or(pool, "worker_count", 2).await?,
        })
    }
}
