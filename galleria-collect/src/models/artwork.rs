//! Artwork record
//!
//! Persisted by external id. Metadata refresh overwrites the mutable metric
//! fields; rows are never deleted by default — works gone upstream are
//! marked stale unless the delete policy is configured.

use crate::models::LogType;
use crate::upstream::ArtworkItem;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Work kind as stored; anything the platform reports beyond illust/manga
/// collapses to Other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtworkKind {
    Illust,
    Manga,
    Other,
}

impl ArtworkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtworkKind::Illust => "illust",
            ArtworkKind::Manga => "manga",
            ArtworkKind::Other => "other",
        }
    }

    pub fn from_upstream(kind: &str) -> Self {
        match kind {
            "illust" => ArtworkKind::Illust,
            "manga" => ArtworkKind::Manga,
            _ => ArtworkKind::Other,
        }
    }
}

impl std::str::FromStr for ArtworkKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "illust" => Ok(ArtworkKind::Illust),
            "manga" => Ok(ArtworkKind::Manga),
            "other" => Ok(ArtworkKind::Other),
            other => Err(format!("unknown artwork kind: {}", other)),
        }
    }
}

/// One collected artwork
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artwork {
    pub id: Uuid,
    /// Platform-side identifier, unique per row
    pub external_id: i64,
    pub title: String,
    pub author_id: i64,
    pub author_name: String,
    pub kind: ArtworkKind,
    pub page_count: u32,
    pub total_bookmarks: u32,
    pub total_view: u32,
    pub posted_at: DateTime<Utc>,
    /// Tag set, comma-joined for storage
    pub tags: String,
    pub is_r18: bool,
    pub is_ai_flagged: bool,
    /// No longer retrievable upstream (mark policy)
    pub is_stale: bool,
    /// Which collection mode first brought the row in
    pub collected_via: LogType,
    pub collected_at: DateTime<Utc>,
    /// Last metadata refresh; seeded with the post date so fresh rows are
    /// not immediately due for update
    pub refreshed_at: DateTime<Utc>,
}

impl Artwork {
    /// Build a record from an upstream listing item
    pub fn from_item(item: &ArtworkItem, collected_via: LogType, now: DateTime<Utc>) -> Self {
        let posted_at = item.posted_at();
        Self {
            id: Uuid::new_v4(),
            external_id: item.id,
            title: item.title.clone(),
            author_id: item.user.id,
            author_name: item.user.name.clone(),
            kind: ArtworkKind::from_upstream(&item.kind),
            page_count: item.page_count,
            total_bookmarks: item.total_bookmarks,
            total_view: item.total_view,
            posted_at,
            tags: item.tag_names().join(","),
            is_r18: item.is_r18(),
            is_ai_flagged: item.is_ai_flagged(),
            is_stale: false,
            collected_via,
            collected_at: now,
            refreshed_at: posted_at,
        }
    }

    pub fn tag_list(&self) -> Vec<&str> {
        if self.tags.is_empty() {
            return Vec::new();
        }
        self.tags.split(',').collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_item() -> ArtworkItem {
        serde_json::from_value(serde_json::json!({
            "id": 9001,
            "title": "rainy street",
            "type": "illust",
            "user": { "id": 55, "name": "kumo" },
            "tags": [{ "name": "city" }, { "name": "rain" }],
            "create_date": "2026-07-30T20:00:00+09:00",
            "page_count": 3,
            "total_bookmarks": 800,
            "total_view": 6000,
        }))
        .unwrap()
    }

    #[test]
    fn from_item_maps_fields() {
        let item = sample_item();
        let now = Utc::now();
        let artwork = Artwork::from_item(&item, LogType::RankingWorks, now);

        assert_eq!(artwork.external_id, 9001);
        assert_eq!(artwork.author_id, 55);
        assert_eq!(artwork.kind, ArtworkKind::Illust);
        assert_eq!(artwork.tags, "city,rain");
        assert!(!artwork.is_r18);
        assert!(!artwork.is_stale);
        assert_eq!(artwork.collected_via, LogType::RankingWorks);
        assert_eq!(artwork.collected_at, now);
        // refresh clock starts at the post date, not the collection date
        assert_eq!(artwork.refreshed_at, artwork.posted_at);
    }

    #[test]
    fn unknown_kind_collapses_to_other() {
        assert_eq!(ArtworkKind::from_upstream("ugoira"), ArtworkKind::Other);
        assert_eq!(ArtworkKind::from_upstream("manga"), ArtworkKind::Manga);
    }

    #[test]
    fn tag_list_splits_stored_form() {
        let item = sample_item();
        let artwork = Artwork::from_item(&item, LogType::CustomRanking, Utc::now());
        assert_eq!(artwork.tag_list(), vec!["city", "rain"]);
    }
}
