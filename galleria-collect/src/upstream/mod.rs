//! Upstream gallery platform API access
//!
//! The client exposes one method per listing the collector walks (rankings,
//! user works, followed users, keyword search) plus single-artwork detail
//! lookup. Every method returns a typed error carrying the HTTP-status-like
//! code that the retry policy classifies.

pub mod client;
pub mod credentials;
pub mod types;

pub use client::{ApiClient, RankingPeriod};
pub use credentials::{ApiCredential, CredentialStore};
pub use types::{ArtworkItem, UserPreview};

use thiserror::Error;

/// Errors raised by the upstream API client
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Upstream returned a non-success HTTP status
    #[error("Upstream API returned {status}: {message}")]
    Api { status: u16, message: String },

    /// Request never completed (connect, timeout, TLS)
    #[error("Network error: {0}")]
    Network(String),

    /// Response body did not match the expected shape
    #[error("Parse error: {0}")]
    Parse(String),

    /// Token refresh failed, or the refreshed token was rejected again
    #[error("Credential error: {0}")]
    Credential(String),
}

impl UpstreamError {
    /// HTTP-status-like code, when one exists
    pub fn status(&self) -> Option<u16> {
        match self {
            UpstreamError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True when the upstream says the resource no longer exists
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

/// One page of a paginated upstream listing
///
/// `next_offset` is the continuation parsed from the upstream's `next_url`;
/// `None` means the listing is exhausted.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_offset: Option<u32>,
}

impl<T> Page<T> {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Parse the `offset` query parameter out of an upstream continuation URL
pub(crate) fn parse_next_offset(next_url: Option<&str>) -> Option<u32> {
    let next_url = next_url?;
    let parsed = url::Url::parse(next_url).ok()?;
    parsed
        .query_pairs()
        .find(|(key, _)| key == "offset")
        .and_then(|(_, value)| value.parse::<u32>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_offset_from_next_url() {
        let url = "https://gallery.example/v1/search?word=landscape&offset=60";
        assert_eq!(parse_next_offset(Some(url)), Some(60));
    }

    #[test]
    fn missing_next_url_means_exhausted() {
        assert_eq!(parse_next_offset(None), None);
    }

    #[test]
    fn url_without_offset_param_is_none() {
        let url = "https://gallery.example/v1/search?word=landscape";
        assert_eq!(parse_next_offset(Some(url)), None);
    }

    #[test]
    fn error_status_accessor() {
        let err = UpstreamError::Api {
            status: 429,
            message: "rate limited".to_string(),
        };
        assert_eq!(err.status(), Some(429));
        assert!(!err.is_not_found());

        let gone = UpstreamError::Api {
            status: 404,
            message: "deleted".to_string(),
        };
        assert!(gone.is_not_found());

        assert_eq!(UpstreamError::Network("timeout".to_string()).status(), None);
    }
}
