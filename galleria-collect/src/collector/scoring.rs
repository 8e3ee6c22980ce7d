//! Quality scoring for keyword-search collection
//!
//! The platform offers no ranking for arbitrary keywords, so this filter
//! approximates one: hard rejection rules first, then a bookmark-velocity
//! score weighted by the bookmark/view ratio, judged against an
//! age-dependent threshold. AI-generated works are admitted but discounted.

use crate::upstream::ArtworkItem;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Scoring tunables, re-read from settings per run
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    /// Reject works younger than this (metrics not yet meaningful)
    pub min_age_hours: f64,
    pub min_bookmarks: u32,
    pub max_page_count: u32,
    /// Score multiplier for AI-flagged works younger than the fresh window
    pub ai_fresh_multiplier: f64,
    /// Score multiplier for AI-flagged works at or past the fresh window
    pub ai_aged_multiplier: f64,
    /// Acceptance threshold inside the fresh window
    pub fresh_threshold: f64,
    /// Acceptance threshold past the fresh window
    pub aged_threshold: f64,
    /// Boundary between the two threshold regimes, hours
    pub fresh_window_hours: f64,
    /// Search walk: never fetch at or past this offset
    pub max_offset: u32,
    /// Search walk: stop once a page's oldest item exceeds this age
    pub max_item_age_hours: f64,
    /// Search walk: stop once more than this many items were accepted
    pub keyword_accept_cap: u32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            min_age_hours: 3.0,
            min_bookmarks: 300,
            max_page_count: 5,
            ai_fresh_multiplier: 0.45,
            ai_aged_multiplier: 0.65,
            fresh_threshold: 9.0,
            aged_threshold: 3.2,
            fresh_window_hours: 24.0,
            max_offset: 3000,
            max_item_age_hours: 72.0,
            keyword_accept_cap: 50,
        }
    }
}

/// Why an item was skipped without (or despite) scoring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    TooNew,
    LowBookmarks,
    AdultContent,
    TooManyPages,
    NotIllustration,
    NoViews,
    BelowThreshold,
}

/// Filter decision for one candidate item
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Accepted { score: f64 },
    Rejected { reason: RejectReason },
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted { .. })
    }
}

/// Accept/reject decisions for keyword-search candidates
#[derive(Debug, Clone)]
pub struct ScoringFilter {
    config: ScoringConfig,
}

impl ScoringFilter {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Judge one candidate. Rejection rules run in a fixed order before any
    /// score is computed.
    pub fn evaluate(&self, item: &ArtworkItem, now: DateTime<Utc>) -> Verdict {
        let age_hours = item.age_hours(now);

        if age_hours < self.config.min_age_hours {
            return Verdict::Rejected { reason: RejectReason::TooNew };
        }
        if item.total_bookmarks < self.config.min_bookmarks {
            return Verdict::Rejected { reason: RejectReason::LowBookmarks };
        }
        if item.is_r18() {
            return Verdict::Rejected { reason: RejectReason::AdultContent };
        }
        if item.page_count > self.config.max_page_count {
            return Verdict::Rejected { reason: RejectReason::TooManyPages };
        }
        if !item.is_illustration() || item.has_comic_tag() {
            return Verdict::Rejected { reason: RejectReason::NotIllustration };
        }
        if item.total_view == 0 {
            // Formula is undefined without views; a work nobody has seen
            // has no meaningful bookmark ratio either.
            return Verdict::Rejected { reason: RejectReason::NoViews };
        }

        let score = self.score(item, age_hours);
        let threshold = if age_hours < self.config.fresh_window_hours {
            self.config.fresh_threshold
        } else {
            self.config.aged_threshold
        };

        if score >= threshold {
            Verdict::Accepted { score }
        } else {
            Verdict::Rejected { reason: RejectReason::BelowThreshold }
        }
    }

    /// Bookmark velocity weighted by the bookmark/view ratio, with the AI
    /// discount applied.
    fn score(&self, item: &ArtworkItem, age_hours: f64) -> f64 {
        let bookmarks = item.total_bookmarks as f64;
        let views = item.total_view as f64;

        let mut score = bookmarks / (age_hours + 2.0) * (bookmarks / views);

        if item.is_ai_flagged() {
            score *= if age_hours < self.config.fresh_window_hours {
                self.config.ai_fresh_multiplier
            } else {
                self.config.ai_aged_multiplier
            };
        }

        score
    }
}
