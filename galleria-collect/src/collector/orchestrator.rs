//! Collection run orchestration
//!
//! One `run()` call drives one collection mode end to end: it opens a
//! collection log, walks the relevant upstream listing(s) through the paced
//! fetcher, persists accepted items incrementally, and closes the log with
//! a terminal status. Page-level fetch failures and cancellation downgrade
//! the run to partial — items persisted before the failure stand. Anything
//! unrecoverable (dead credentials, database outage) fails the run with the
//! error summary in the log message.

use super::{
    CollectError, PageWalk, RateLimiter, RetryPolicy, ScoringFilter,
};
use crate::config::{CollectorConfig, InvalidArtworkAction};
use crate::db;
use crate::models::{Artwork, CollectionLog, FollowedUser, LogStatus, LogType};
use crate::upstream::{ApiClient, ArtworkItem, RankingPeriod, UpstreamError};
use chrono::{DateTime, Duration, Utc};
use galleria_common::events::{CollectEvent, EventBus};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// One collection mode with its parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CollectMode {
    /// Platform-curated ranking, unconditional acceptance
    RankingWorks {
        period: RankingPeriod,
        /// Pages to pull; defaults to the configured ranking_pages
        pages: Option<u32>,
    },
    /// Refresh the followed-user set
    FollowSync,
    /// New works from followed users
    FollowNewWorks,
    /// Historical collection for users whose backfill has not completed
    InitialBackfill,
    /// Keyword search through the scoring filter
    CustomRanking { keywords: Vec<String> },
    /// Re-fetch metadata of aging artworks
    MetadataUpdate,
    /// Delete old collection logs
    LogCleanup,
}

impl CollectMode {
    pub fn log_type(&self) -> LogType {
        match self {
            CollectMode::RankingWorks { .. } => LogType::RankingWorks,
            CollectMode::FollowSync => LogType::FollowSync,
            CollectMode::FollowNewWorks => LogType::FollowNewWorks,
            CollectMode::InitialBackfill => LogType::InitialBackfill,
            CollectMode::CustomRanking { .. } => LogType::CustomRanking,
            CollectMode::MetadataUpdate => LogType::MetadataUpdate,
            CollectMode::LogCleanup => LogType::LogCleanup,
        }
    }

    /// Serialization key for the one-in-flight-run-per-target rule.
    ///
    /// Rankings serialize per period; custom rankings per keyword set;
    /// all metadata-update runs share a single key.
    pub fn target_key(&self) -> String {
        match self {
            CollectMode::RankingWorks { period, .. } => {
                format!("ranking_works:{}", period.as_str())
            }
            CollectMode::CustomRanking { keywords } => {
                let mut sorted = keywords.clone();
                sorted.sort();
                format!("custom_ranking:{}", sorted.join(","))
            }
            other => other.log_type().as_str().to_string(),
        }
    }
}

/// Terminal result of one collection run
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub log_id: Uuid,
    pub status: LogStatus,
    pub artworks_count: u32,
    pub message: String,
}

/// Result of one mode's body; the count already sits on the log
struct ModeSummary {
    message: String,
    partial: bool,
}

impl ModeSummary {
    fn complete(message: String) -> Self {
        Self { message, partial: false }
    }

    fn partial(message: String) -> Self {
        Self { message, partial: true }
    }
}

/// Drives one collection run per `run()` call
pub struct CollectionOrchestrator {
    db: SqlitePool,
    client: Arc<ApiClient>,
    events: EventBus,
    cancel: CancellationToken,
}

impl CollectionOrchestrator {
    pub fn new(
        db: SqlitePool,
        client: Arc<ApiClient>,
        events: EventBus,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            db,
            client,
            events,
            cancel,
        }
    }

    /// Execute one collection run.
    ///
    /// Never panics outward: every exit path is a terminal RunOutcome whose
    /// message matches the collection log.
    pub async fn run(&self, mode: CollectMode) -> RunOutcome {
        let log_type = mode.log_type();
        let mut log = CollectionLog::new(
            log_type,
            format!("Starting {} collection", log_type.as_str()),
        );
        log.transition_to(LogStatus::Running);

        if let Err(e) = db::collection_logs::save_log(&self.db, &log).await {
            error!(log_type = log_type.as_str(), error = %e, "Failed to create collection log");
            return RunOutcome {
                log_id: log.id,
                status: LogStatus::Failed,
                artworks_count: 0,
                message: format!("Failed to create collection log: {}", e),
            };
        }

        // Tunables are re-read here, per run, so settings edits apply
        // without a restart.
        let config = match CollectorConfig::load(&self.db).await {
            Ok(config) => config,
            Err(e) => {
                return self
                    .finalize(log, LogStatus::Failed, format!("Failed to load configuration: {}", e))
                    .await;
            }
        };

        info!(
            log_id = %log.id,
            log_type = log_type.as_str(),
            "Collection run started"
        );

        let throttle = RateLimiter::new(config.throttle.clone());
        let retry = RetryPolicy::new(config.retry.clone());

        let result = match &mode {
            CollectMode::RankingWorks { period, pages } => {
                let pages = pages.unwrap_or(config.ranking_pages);
                self.collect_ranking(&mut log, &throttle, &retry, *period, pages)
                    .await
            }
            CollectMode::FollowSync => self.sync_follows(&mut log, &throttle, &retry).await,
            CollectMode::FollowNewWorks => {
                self.collect_follow_new_works(&mut log, &config, &throttle, &retry)
                    .await
            }
            CollectMode::InitialBackfill => {
                self.initial_backfill(&mut log, &config, &throttle, &retry).await
            }
            CollectMode::CustomRanking { keywords } => {
                self.custom_ranking(&mut log, &config, &throttle, &retry, keywords)
                    .await
            }
            CollectMode::MetadataUpdate => {
                self.metadata_update(&mut log, &config, &throttle, &retry).await
            }
            CollectMode::LogCleanup => self.log_cleanup(&mut log, &config).await,
        };

        match result {
            Ok(ModeSummary { message, partial: false }) => {
                self.finalize(log, LogStatus::Succeeded, message).await
            }
            Ok(ModeSummary { message, partial: true }) => {
                self.finalize(log, LogStatus::Partial, message).await
            }
            Err(err) if err.is_partial() => {
                let message = format!("Run ended early: {}", err);
                self.finalize(log, LogStatus::Partial, message).await
            }
            Err(err) => {
                let message = format!("Run failed: {}", err);
                self.finalize(log, LogStatus::Failed, message).await
            }
        }
    }

    // ------------------------------------------------------------------
    // Modes
    // ------------------------------------------------------------------

    async fn collect_ranking(
        &self,
        log: &mut CollectionLog,
        throttle: &RateLimiter,
        retry: &RetryPolicy,
        period: RankingPeriod,
        pages: u32,
    ) -> Result<ModeSummary, CollectError> {
        let mut walk = PageWalk::new(throttle, retry, self.cancel.clone(), |offset| {
            self.client.fetch_ranking(period, offset)
        })
        .with_max_pages(pages);

        let mut inserted: u32 = 0;
        let early_end = loop {
            match walk.next_page().await {
                Ok(Some(page)) => {
                    self.emit_page(log.id, walk.last_offset(), page.items.len());
                    let added = self
                        .persist_items(&page.items, LogType::RankingWorks)
                        .await?;
                    inserted += added;
                    self.record_progress(log, added, "Collecting ranking works").await;
                }
                Ok(None) => break None,
                Err(err) if err.is_partial() => break Some(err.to_string()),
                Err(err) => return Err(err),
            }
        };

        Ok(match early_end {
            None => ModeSummary::complete(format!(
                "Collected {} artworks from {} ranking",
                inserted,
                period.as_str()
            )),
            Some(reason) => ModeSummary::partial(format!(
                "Collected {} artworks from {} ranking before early end: {}",
                inserted,
                period.as_str(),
                reason
            )),
        })
    }

    async fn sync_follows(
        &self,
        log: &mut CollectionLog,
        throttle: &RateLimiter,
        retry: &RetryPolicy,
    ) -> Result<ModeSummary, CollectError> {
        let mut walk = PageWalk::new(throttle, retry, self.cancel.clone(), |offset| {
            self.client.fetch_followed_users(offset)
        });

        let mut new_follows: u32 = 0;
        let mut early_end = None;
        'pages: loop {
            match walk.next_page().await {
                Ok(Some(page)) => {
                    self.emit_page(log.id, walk.last_offset(), page.items.len());
                    for preview in &page.items {
                        let user = FollowedUser::new(preview.user.id, &preview.user.name);
                        match db::followed_users::insert_if_absent(&self.db, &user).await {
                            Ok(true) => {
                                new_follows += 1;
                                info!(user_id = preview.user.id, name = %preview.user.name, "New followed user");
                            }
                            Ok(false) => {
                                // The listing is newest-first: a known user
                                // means the rest was synced last time.
                                debug!(user_id = preview.user.id, "Known user reached, ending follow sync");
                                let _ = db::followed_users::update_name(
                                    &self.db,
                                    preview.user.id,
                                    &preview.user.name,
                                )
                                .await;
                                break 'pages;
                            }
                            Err(e) if db::is_systemic(&e) => return Err(e.into()),
                            Err(e) => {
                                warn!(user_id = preview.user.id, error = %e, "Failed to persist followed user (skipping)");
                            }
                        }
                    }
                    self.record_progress(log, 0, "Syncing followed users").await;
                }
                Ok(None) => break,
                Err(err) if err.is_partial() => {
                    early_end = Some(err.to_string());
                    break;
                }
                Err(err) => return Err(err),
            }
        }

        Ok(match early_end {
            None => ModeSummary::complete(format!("Synced {} new follows", new_follows)),
            Some(reason) => ModeSummary::partial(format!(
                "Synced {} new follows before early end: {}",
                new_follows, reason
            )),
        })
    }

    async fn collect_follow_new_works(
        &self,
        log: &mut CollectionLog,
        config: &CollectorConfig,
        throttle: &RateLimiter,
        retry: &RetryPolicy,
    ) -> Result<ModeSummary, CollectError> {
        let mut walk = PageWalk::new(throttle, retry, self.cancel.clone(), |offset| {
            self.client.fetch_follow_feed(offset)
        });

        let mut inserted: u32 = 0;
        let mut new_users: u32 = 0;
        let mut backlogged: u32 = 0;
        let mut early_end = None;

        'pages: loop {
            match walk.next_page().await {
                Ok(Some(page)) => {
                    self.emit_page(log.id, walk.last_offset(), page.items.len());
                    let now = Utc::now();
                    let mut added: u32 = 0;
                    let mut reached_known = false;

                    for item in &page.items {
                        match self.known_artwork_disposition(item).await? {
                            ItemDisposition::Stop => {
                                reached_known = true;
                                break;
                            }
                            ItemDisposition::Skip => continue,
                            ItemDisposition::Process => {}
                        }

                        // A feed item from an unknown author means a freshly
                        // followed user: register them and pull their history
                        // inline, best-effort.
                        match db::followed_users::get(&self.db, item.user.id).await {
                            Ok(Some(_)) => {
                                let _ = db::followed_users::update_name(
                                    &self.db,
                                    item.user.id,
                                    &item.user.name,
                                )
                                .await;
                            }
                            Ok(None) => {
                                let user = FollowedUser::new(item.user.id, &item.user.name);
                                match db::followed_users::insert_if_absent(&self.db, &user).await {
                                    Ok(true) => {
                                        new_users += 1;
                                        info!(user_id = item.user.id, name = %item.user.name, "New user discovered in follow feed");
                                        let (count, backfill_end) = self
                                            .backfill_user(
                                                throttle,
                                                retry,
                                                item.user.id,
                                                config.backtrack_years,
                                            )
                                            .await?;
                                        backlogged += count;
                                        if backfill_end.is_none() {
                                            let _ = db::followed_users::set_backfill_completed(
                                                &self.db,
                                                item.user.id,
                                            )
                                            .await;
                                        }
                                        let _ = db::followed_users::mark_synced(
                                            &self.db,
                                            item.user.id,
                                            Utc::now(),
                                        )
                                        .await;
                                    }
                                    Ok(false) => {}
                                    Err(e) if db::is_systemic(&e) => return Err(e.into()),
                                    Err(e) => {
                                        warn!(user_id = item.user.id, error = %e, "Failed to register new user (skipping)");
                                    }
                                }
                            }
                            Err(e) if db::is_systemic(&e) => return Err(e.into()),
                            Err(e) => {
                                warn!(user_id = item.user.id, error = %e, "Failed to look up followed user");
                            }
                        }

                        let artwork = Artwork::from_item(item, LogType::FollowNewWorks, now);
                        if self.persist_artwork(&artwork).await? {
                            added += 1;
                        }
                    }

                    inserted += added;
                    self.record_progress(log, added, "Collecting follow feed").await;

                    if reached_known {
                        break 'pages;
                    }
                }
                Ok(None) => break,
                Err(err) if err.is_partial() => {
                    early_end = Some(err.to_string());
                    break;
                }
                Err(err) => return Err(err),
            }
        }

        let mut message = format!("Collected {} new artworks from follows", inserted);
        if new_users > 0 {
            message.push_str(&format!(", found {} new users", new_users));
        }
        if backlogged > 0 {
            message.push_str(&format!(", backlogged {} artworks", backlogged));
        }

        Ok(match early_end {
            None => ModeSummary::complete(message),
            Some(reason) => {
                message.push_str(&format!(" (early end: {})", reason));
                ModeSummary::partial(message)
            }
        })
    }

    async fn initial_backfill(
        &self,
        log: &mut CollectionLog,
        config: &CollectorConfig,
        throttle: &RateLimiter,
        retry: &RetryPolicy,
    ) -> Result<ModeSummary, CollectError> {
        let users = db::followed_users::list_pending_backfill(&self.db).await?;
        info!(users = users.len(), "Starting initial backfill");

        let mut total: u32 = 0;
        let mut completed: u32 = 0;
        let mut failed_users: Vec<String> = Vec::new();
        let mut cancelled = false;

        for (idx, user) in users.iter().enumerate() {
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            info!(user_id = user.external_id, name = %user.name, "Backfilling user history");
            let (count, early_end) = self
                .backfill_user(throttle, retry, user.external_id, config.backtrack_years)
                .await?;
            total += count;
            self.record_progress(log, count, "Backfilling followed users").await;

            match early_end {
                None => {
                    db::followed_users::set_backfill_completed(&self.db, user.external_id).await?;
                    db::followed_users::mark_synced(&self.db, user.external_id, Utc::now()).await?;
                    completed += 1;
                }
                Some(reason) => {
                    // Leave backfill_completed unset so the next run retries
                    // this user from the top.
                    warn!(user_id = user.external_id, reason = %reason, "User backfill ended early");
                    failed_users.push(user.name.clone());
                }
            }

            throttle.batch_pause((idx + 1) as u32).await;
        }

        let mut message = format!(
            "Backfilled {} artworks from {}/{} users",
            total,
            completed,
            users.len()
        );
        if !failed_users.is_empty() {
            message.push_str(&format!(", incomplete: {}", failed_users.join(", ")));
        }
        if cancelled {
            message.push_str(" (cancelled)");
        }

        Ok(if failed_users.is_empty() && !cancelled {
            ModeSummary::complete(message)
        } else {
            ModeSummary::partial(message)
        })
    }

    async fn custom_ranking(
        &self,
        log: &mut CollectionLog,
        config: &CollectorConfig,
        throttle: &RateLimiter,
        retry: &RetryPolicy,
        keywords: &[String],
    ) -> Result<ModeSummary, CollectError> {
        let filter = ScoringFilter::new(config.scoring.clone());

        let mut total: u32 = 0;
        let mut early_ends: Vec<String> = Vec::new();
        let mut cancelled = false;

        for keyword in keywords {
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            info!(keyword = %keyword, "Scoring keyword search");
            let (accepted, early_end) = self
                .collect_keyword(throttle, retry, &filter, keyword)
                .await?;

            // Persist immediately after this keyword's walk so partial
            // progress survives a failure on a later keyword.
            let added = self
                .persist_items(&accepted, LogType::CustomRanking)
                .await?;
            total += added;
            self.record_progress(log, added, &format!("Collected keyword '{}'", keyword))
                .await;

            info!(
                keyword = %keyword,
                accepted = accepted.len(),
                inserted = added,
                "Keyword walk finished"
            );

            if let Some(reason) = early_end {
                early_ends.push(format!("{}: {}", keyword, reason));
            }
        }

        let mut message = format!(
            "Accepted {} artworks across {} keywords",
            total,
            keywords.len()
        );
        if !early_ends.is_empty() {
            message.push_str(&format!(" (early ends: {})", early_ends.join("; ")));
        }
        if cancelled {
            message.push_str(" (cancelled)");
        }

        Ok(if early_ends.is_empty() && !cancelled {
            ModeSummary::complete(message)
        } else {
            ModeSummary::partial(message)
        })
    }

    /// Walk one keyword's search listing through the scoring filter.
    ///
    /// Stops on: offset ceiling (inside the walk), a page whose oldest item
    /// is older than the configured age window, the per-keyword accept cap,
    /// or upstream page exhaustion. Returns the accepted items and an
    /// early-end reason when retries ran out mid-walk.
    async fn collect_keyword(
        &self,
        throttle: &RateLimiter,
        retry: &RetryPolicy,
        filter: &ScoringFilter,
        keyword: &str,
    ) -> Result<(Vec<ArtworkItem>, Option<String>), CollectError> {
        let scoring = filter.config();
        let max_age = Duration::seconds((scoring.max_item_age_hours * 3600.0) as i64);
        let accept_cap = scoring.keyword_accept_cap;

        let mut walk = PageWalk::new(throttle, retry, self.cancel.clone(), |offset| {
            self.client.search(keyword, offset)
        })
        .with_max_offset(scoring.max_offset);

        let mut accepted: Vec<ArtworkItem> = Vec::new();
        let mut early_end = None;

        loop {
            match walk.next_page().await {
                Ok(Some(page)) => {
                    let now = Utc::now();
                    let age_cutoff = now - max_age;
                    let mut oldest: Option<DateTime<Utc>> = None;

                    for item in page.items {
                        let posted = item.posted_at();
                        if oldest.map_or(true, |o| posted < o) {
                            oldest = Some(posted);
                        }
                        if filter.evaluate(&item, now).is_accepted() {
                            accepted.push(item);
                        }
                    }

                    if accepted.len() as u32 > accept_cap {
                        debug!(keyword, accepted = accepted.len(), "Accept cap reached, ending keyword walk");
                        break;
                    }
                    if let Some(oldest) = oldest {
                        if oldest < age_cutoff {
                            debug!(keyword, oldest = %oldest, "Age window exceeded, ending keyword walk");
                            break;
                        }
                    }
                }
                Ok(None) => break,
                Err(err) if err.is_partial() => {
                    early_end = Some(err.to_string());
                    break;
                }
                Err(err) => return Err(err),
            }
        }

        Ok((accepted, early_end))
    }

    async fn metadata_update(
        &self,
        log: &mut CollectionLog,
        config: &CollectorConfig,
        throttle: &RateLimiter,
        retry: &RetryPolicy,
    ) -> Result<ModeSummary, CollectError> {
        let cutoff = Utc::now() - Duration::days(config.update_interval_days as i64);
        let artworks = db::artworks::list_due_for_refresh(&self.db, cutoff, config.update_max_per_run)
            .await?;
        info!(due = artworks.len(), "Starting metadata update");

        let mut updated: u32 = 0;
        let mut removed: u32 = 0;
        let mut errors: u32 = 0;
        let mut cancelled = false;

        for (idx, artwork) in artworks.iter().enumerate() {
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            throttle.wait().await;

            match self.client.fetch_artwork_detail(artwork.external_id).await {
                Ok(item) => {
                    let now = Utc::now();
                    let changed = item.total_bookmarks != artwork.total_bookmarks
                        || item.total_view != artwork.total_view;

                    let write = if changed {
                        db::artworks::update_metrics(
                            &self.db,
                            artwork.external_id,
                            item.total_bookmarks,
                            item.total_view,
                            now,
                        )
                        .await
                    } else {
                        db::artworks::touch_refreshed(&self.db, artwork.external_id, now).await
                    };

                    match write {
                        Ok(()) => {
                            if changed {
                                updated += 1;
                                self.record_progress(log, 1, "Refreshing artwork metadata").await;
                            }
                        }
                        Err(e) if db::is_systemic(&e) => return Err(e.into()),
                        Err(e) => {
                            warn!(external_id = artwork.external_id, error = %e, "Failed to write refreshed metrics (skipping)");
                        }
                    }
                }
                Err(err) if err.is_not_found() => {
                    // Gone upstream: apply the configured policy.
                    match config.invalid_artwork_action {
                        InvalidArtworkAction::Mark => {
                            db::artworks::mark_stale(&self.db, artwork.external_id).await?;
                        }
                        InvalidArtworkAction::Delete => {
                            db::artworks::delete_by_external_id(&self.db, artwork.external_id)
                                .await?;
                        }
                    }
                    removed += 1;
                    info!(
                        external_id = artwork.external_id,
                        action = ?config.invalid_artwork_action,
                        "Artwork no longer retrievable upstream"
                    );
                }
                Err(UpstreamError::Credential(message)) => {
                    return Err(CollectError::Credential(message));
                }
                Err(err) => {
                    // Single-item refresh failure: back off per class, skip
                    // the item.
                    errors += 1;
                    let class = retry.classify(&err);
                    let backoff = retry.backoff_for(class);
                    warn!(
                        external_id = artwork.external_id,
                        class = ?class,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "Metadata fetch failed, backing off and skipping"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }

            throttle.batch_pause((idx + 1) as u32).await;
        }

        let mut message = format!(
            "Refreshed {} of {} artworks, {} removed upstream, {} errors",
            updated,
            artworks.len(),
            removed,
            errors
        );
        if cancelled {
            message.push_str(" (cancelled)");
        }

        Ok(if cancelled {
            ModeSummary::partial(message)
        } else {
            ModeSummary::complete(message)
        })
    }

    async fn log_cleanup(
        &self,
        log: &mut CollectionLog,
        config: &CollectorConfig,
    ) -> Result<ModeSummary, CollectError> {
        let cutoff = Utc::now() - Duration::days(config.log_retention_days as i64);
        let deleted = db::collection_logs::delete_older_than(&self.db, cutoff).await?;
        self.record_progress(log, deleted as u32, "Cleaning up old logs").await;

        Ok(ModeSummary::complete(format!(
            "Deleted {} logs older than {} days",
            deleted, config.log_retention_days
        )))
    }

    // ------------------------------------------------------------------
    // Shared plumbing
    // ------------------------------------------------------------------

    /// Walk one user's works back to the cutoff, inserting as we go.
    ///
    /// Returns the inserted count and an early-end reason if retries ran out.
    async fn backfill_user(
        &self,
        throttle: &RateLimiter,
        retry: &RetryPolicy,
        user_id: i64,
        backtrack_years: u32,
    ) -> Result<(u32, Option<String>), CollectError> {
        let cutoff = Utc::now() - Duration::days(backtrack_years as i64 * 365);

        let mut walk = PageWalk::new(throttle, retry, self.cancel.clone(), |offset| {
            self.client.fetch_user_works(user_id, offset)
        });

        let mut inserted: u32 = 0;
        let mut early_end = None;

        loop {
            match walk.next_page().await {
                Ok(Some(page)) => {
                    let now = Utc::now();
                    let mut reached_cutoff = false;

                    for item in &page.items {
                        if item.posted_at() < cutoff {
                            debug!(user_id, posted = %item.posted_at(), "Backtrack window reached");
                            reached_cutoff = true;
                            break;
                        }
                        let artwork = Artwork::from_item(item, LogType::InitialBackfill, now);
                        if self.persist_artwork(&artwork).await? {
                            inserted += 1;
                        }
                    }

                    if reached_cutoff {
                        break;
                    }
                }
                Ok(None) => break,
                Err(err) if err.is_partial() => {
                    early_end = Some(err.to_string());
                    break;
                }
                Err(err) => return Err(err),
            }
        }

        Ok((inserted, early_end))
    }

    /// How the follow feed treats an item that may already be collected
    async fn known_artwork_disposition(
        &self,
        item: &ArtworkItem,
    ) -> Result<ItemDisposition, CollectError> {
        let existing = match db::artworks::get_by_external_id(&self.db, item.id).await {
            Ok(existing) => existing,
            Err(e) if db::is_systemic(&e) => return Err(e.into()),
            Err(e) => {
                warn!(external_id = item.id, error = %e, "Artwork lookup failed, processing item anyway");
                return Ok(ItemDisposition::Process);
            }
        };

        match existing.map(|a| a.collected_via) {
            None => Ok(ItemDisposition::Process),
            Some(LogType::FollowNewWorks) | Some(LogType::InitialBackfill) => {
                // Feed is newest-first: a follow-collected item means the
                // rest was already seen last run.
                info!(external_id = item.id, "Reached previously collected work, ending feed walk");
                Ok(ItemDisposition::Stop)
            }
            Some(LogType::RankingWorks) => {
                // Ranking got there first; re-attribute and keep going.
                db::artworks::set_collected_via(&self.db, item.id, LogType::FollowNewWorks)
                    .await
                    .ok();
                Ok(ItemDisposition::Skip)
            }
            Some(_) => Ok(ItemDisposition::Skip),
        }
    }

    async fn persist_items(
        &self,
        items: &[ArtworkItem],
        via: LogType,
    ) -> Result<u32, CollectError> {
        let now = Utc::now();
        let mut added: u32 = 0;
        for item in items {
            let artwork = Artwork::from_item(item, via, now);
            if self.persist_artwork(&artwork).await? {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Insert one artwork. A bad row is logged and skipped; a database
    /// outage aborts the run.
    async fn persist_artwork(&self, artwork: &Artwork) -> Result<bool, CollectError> {
        match db::artworks::insert_if_absent(&self.db, artwork).await {
            Ok(inserted) => Ok(inserted),
            Err(e) if db::is_systemic(&e) => Err(e.into()),
            Err(e) => {
                warn!(
                    external_id = artwork.external_id,
                    error = %e,
                    "Failed to persist artwork (skipping)"
                );
                Ok(false)
            }
        }
    }

    /// Bump the log's running count and save so status polls see progress
    async fn record_progress(&self, log: &mut CollectionLog, added: u32, operation: &str) {
        log.artworks_count += added;
        log.message = operation.to_string();
        if let Err(e) = db::collection_logs::save_log(&self.db, log).await {
            warn!(log_id = %log.id, error = %e, "Failed to save log progress");
        }
        self.events.emit(CollectEvent::ProgressUpdated {
            log_id: log.id,
            artworks_count: log.artworks_count,
            operation: operation.to_string(),
        });
    }

    fn emit_page(&self, log_id: Uuid, offset: u32, items: usize) {
        self.events.emit(CollectEvent::PageFetched {
            log_id,
            offset,
            items,
        });
    }

    async fn finalize(
        &self,
        mut log: CollectionLog,
        status: LogStatus,
        message: String,
    ) -> RunOutcome {
        log.message = message.clone();
        log.transition_to(status);

        if let Err(e) = db::collection_logs::save_log(&self.db, &log).await {
            error!(log_id = %log.id, error = %e, "Failed to save terminal log state");
        }

        match status {
            LogStatus::Succeeded => info!(
                log_id = %log.id,
                artworks = log.artworks_count,
                message = %message,
                "Collection run succeeded"
            ),
            LogStatus::Partial => warn!(
                log_id = %log.id,
                artworks = log.artworks_count,
                message = %message,
                "Collection run partial"
            ),
            _ => error!(
                log_id = %log.id,
                message = %message,
                "Collection run failed"
            ),
        }

        RunOutcome {
            log_id: log.id,
            status: log.status,
            artworks_count: log.artworks_count,
            message,
        }
    }
}

/// Follow-feed decision for one already-seen item
enum ItemDisposition {
    Process,
    Skip,
    Stop,
}
