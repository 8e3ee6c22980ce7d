//! Upstream API response types

use chrono::{DateTime, FixedOffset, Utc};
use serde::Deserialize;

/// AI-generation flag value the platform assigns to machine-generated works
const AI_GENERATED: u8 = 2;

const R18_MARKERS: [&str; 4] = ["R-18G", "R-18", "R18G", "R18"];
const COMIC_TAGS: [&str; 2] = ["漫画", "manga"];
const AI_TAGS: [&str; 2] = ["AI生成", "AI-generated"];

/// One artwork entry as returned by ranking, feed, search and detail calls
#[derive(Debug, Clone, Deserialize)]
pub struct ArtworkItem {
    pub id: i64,
    pub title: String,
    /// Work kind reported by the platform: "illust", "manga", "ugoira", ...
    #[serde(rename = "type", default)]
    pub kind: String,
    pub user: UpstreamUser,
    #[serde(default)]
    pub tags: Vec<UpstreamTag>,
    /// Post timestamp with the uploader's zone offset
    pub create_date: DateTime<FixedOffset>,
    #[serde(default = "default_page_count")]
    pub page_count: u32,
    #[serde(default)]
    pub total_bookmarks: u32,
    #[serde(default)]
    pub total_view: u32,
    /// 0 = unknown, 1 = human, 2 = AI-generated
    #[serde(default)]
    pub illust_ai_type: u8,
}

fn default_page_count() -> u32 {
    1
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamUser {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamTag {
    pub name: String,
}

impl ArtworkItem {
    /// Tag names as owned strings
    pub fn tag_names(&self) -> Vec<String> {
        self.tags.iter().map(|t| t.name.clone()).collect()
    }

    /// Post timestamp normalized to UTC
    pub fn posted_at(&self) -> DateTime<Utc> {
        self.create_date.with_timezone(&Utc)
    }

    /// Hours elapsed since posting (fractional, never negative)
    pub fn age_hours(&self, now: DateTime<Utc>) -> f64 {
        let secs = (now - self.posted_at()).num_seconds();
        (secs.max(0) as f64) / 3600.0
    }

    /// Any tag carrying an R-18 marker flags the work as adult content
    pub fn is_r18(&self) -> bool {
        self.tags.iter().any(|tag| {
            let upper = tag.name.to_uppercase();
            R18_MARKERS.iter().any(|marker| upper.contains(marker))
        })
    }

    /// Work is an illustration (not manga, animation, ...)
    pub fn is_illustration(&self) -> bool {
        self.kind == "illust"
    }

    /// Tags mark the work as a comic/manga regardless of its reported kind
    pub fn has_comic_tag(&self) -> bool {
        self.tags.iter().any(|tag| {
            let lower = tag.name.to_lowercase();
            COMIC_TAGS.iter().any(|comic| lower == *comic)
        })
    }

    /// Platform AI flag, or an AI-generation tag
    pub fn is_ai_flagged(&self) -> bool {
        if self.illust_ai_type == AI_GENERATED {
            return true;
        }
        self.tags.iter().any(|tag| {
            let lower = tag.name.to_lowercase();
            AI_TAGS.iter().any(|ai| lower == ai.to_lowercase())
        })
    }
}

/// Followed-user entry from the follow listing
#[derive(Debug, Clone, Deserialize)]
pub struct UserPreview {
    pub user: UpstreamUser,
}

// ============================================================================
// Response envelopes
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct IllustListingResponse {
    #[serde(default)]
    pub illusts: Vec<ArtworkItem>,
    #[serde(default)]
    pub next_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FollowingResponse {
    #[serde(default)]
    pub user_previews: Vec<UserPreview>,
    #[serde(default)]
    pub next_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct IllustDetailResponse {
    pub illust: ArtworkItem,
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Lifetime of the access token in seconds
    pub expires_in: i64,
}
