//! Upstream gallery platform HTTP client
//!
//! Thin typed wrapper over the platform's JSON API. Pacing and retry live in
//! the collector; this layer only authenticates, issues single requests and
//! maps failures onto `UpstreamError`. A 401 triggers one forced credential
//! refresh and retry; a second rejection surfaces as a credential error that
//! fails the whole run.

use super::credentials::CredentialStore;
use super::types::{
    ArtworkItem, FollowingResponse, IllustDetailResponse, IllustListingResponse, UserPreview,
};
use super::{parse_next_offset, Page, UpstreamError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Ranking listing period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankingPeriod {
    Day,
    Week,
    Month,
}

impl RankingPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RankingPeriod::Day => "day",
            RankingPeriod::Week => "week",
            RankingPeriod::Month => "month",
        }
    }
}

impl std::str::FromStr for RankingPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day" => Ok(RankingPeriod::Day),
            "week" => Ok(RankingPeriod::Week),
            "month" => Ok(RankingPeriod::Month),
            other => Err(format!("unknown ranking period: {}", other)),
        }
    }
}

/// Upstream API client
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Arc<CredentialStore>,
}

impl ApiClient {
    pub fn new(base_url: String, credentials: Arc<CredentialStore>) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
        }
    }

    /// Platform-curated ranking listing
    pub async fn fetch_ranking(
        &self,
        period: RankingPeriod,
        offset: u32,
    ) -> Result<Page<ArtworkItem>, UpstreamError> {
        let listing: IllustListingResponse = self
            .get_json(
                "/v1/illust/ranking",
                &[("mode", period.as_str().to_string()), ("offset", offset.to_string())],
            )
            .await?;
        Ok(listing_page(listing))
    }

    /// One user's works, newest first
    pub async fn fetch_user_works(
        &self,
        user_id: i64,
        offset: u32,
    ) -> Result<Page<ArtworkItem>, UpstreamError> {
        let listing: IllustListingResponse = self
            .get_json(
                "/v1/user/illusts",
                &[("user_id", user_id.to_string()), ("offset", offset.to_string())],
            )
            .await?;
        Ok(listing_page(listing))
    }

    /// New works from followed users, newest first
    pub async fn fetch_follow_feed(&self, offset: u32) -> Result<Page<ArtworkItem>, UpstreamError> {
        let listing: IllustListingResponse = self
            .get_json(
                "/v2/illust/follow",
                &[("restrict", "public".to_string()), ("offset", offset.to_string())],
            )
            .await?;
        Ok(listing_page(listing))
    }

    /// Users the authenticated account follows
    pub async fn fetch_followed_users(
        &self,
        offset: u32,
    ) -> Result<Page<UserPreview>, UpstreamError> {
        let listing: FollowingResponse = self
            .get_json("/v1/user/following", &[("offset", offset.to_string())])
            .await?;
        let next_offset = parse_next_offset(listing.next_url.as_deref());
        Ok(Page {
            items: listing.user_previews,
            next_offset,
        })
    }

    /// Keyword search, newest first
    pub async fn search(&self, keyword: &str, offset: u32) -> Result<Page<ArtworkItem>, UpstreamError> {
        let listing: IllustListingResponse = self
            .get_json(
                "/v1/search/illust",
                &[
                    ("word", keyword.to_string()),
                    ("search_target", "partial_match_for_tags".to_string()),
                    ("sort", "date_desc".to_string()),
                    ("offset", offset.to_string()),
                ],
            )
            .await?;
        Ok(listing_page(listing))
    }

    /// Single-artwork detail lookup (metadata refresh)
    pub async fn fetch_artwork_detail(&self, artwork_id: i64) -> Result<ArtworkItem, UpstreamError> {
        let detail: IllustDetailResponse = self
            .get_json("/v1/illust/detail", &[("illust_id", artwork_id.to_string())])
            .await?;
        Ok(detail.illust)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, UpstreamError> {
        let token = self.credentials.get_valid_token().await?;

        match self.execute(path, query, &token).await {
            Err(UpstreamError::Api { status: 401, .. }) => {
                // Token rejected mid-flight: refresh once and retry; a second
                // 401 means the credential set itself is dead.
                debug!(path, "Upstream rejected token, forcing refresh");
                let token = self.credentials.force_refresh().await?;
                match self.execute(path, query, &token).await {
                    Err(UpstreamError::Api { status: 401, message }) => Err(
                        UpstreamError::Credential(format!(
                            "Upstream rejected freshly refreshed token: {}",
                            message
                        )),
                    ),
                    other => other,
                }
            }
            other => other,
        }
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        token: &str,
    ) -> Result<T, UpstreamError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "Upstream request");

        let response = self
            .http
            .get(&url)
            .query(query)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| UpstreamError::Network(format!("Request to {} failed: {}", path, e)))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| UpstreamError::Parse(format!("Response from {} unparseable: {}", path, e)))
    }
}

fn listing_page(listing: IllustListingResponse) -> Page<ArtworkItem> {
    let next_offset = parse_next_offset(listing.next_url.as_deref());
    Page {
        items: listing.illusts,
        next_offset,
    }
}
