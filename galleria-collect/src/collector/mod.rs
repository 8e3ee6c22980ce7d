//! Collection & scoring engine
//!
//! The pipeline: the orchestrator drives a paged walk over one upstream
//! listing; every page fetch is paced by the rate limiter and recovered by
//! the retry policy; items from scored modes pass the scoring filter before
//! persistence. One run owns one collection log and updates it in place.

pub mod orchestrator;
pub mod pager;
pub mod rate_limiter;
pub mod retry;
pub mod scoring;

pub use orchestrator::{CollectMode, CollectionOrchestrator, RunOutcome};
pub use pager::PageWalk;
pub use rate_limiter::{RateLimiter, ThrottleConfig};
pub use retry::{BackoffWindow, ErrorClass, RetryConfig, RetryPolicy};
pub use scoring::{RejectReason, ScoringConfig, ScoringFilter, Verdict};

use crate::upstream::UpstreamError;
use thiserror::Error;

/// Failures a collection run can hit.
///
/// Rate-limited / forbidden / transient upstream errors are recovered inside
/// the page walk and never surface here; what does surface is either a
/// partial-run condition (retries exhausted, cancellation) or a run-fatal
/// one (dead credentials, systemic persistence failure).
#[derive(Debug, Error)]
pub enum CollectError {
    /// Retries for one page ran out; the walk ends early
    #[error("Page fetch exhausted retries at offset {offset}: {source}")]
    FetchExhausted {
        offset: u32,
        #[source]
        source: UpstreamError,
    },

    /// Credential refresh failed, or a refreshed token was rejected again
    #[error("Credential failure: {0}")]
    Credential(String),

    /// The database rejected a write
    #[error("Persistence failure: {0}")]
    Persistence(#[from] galleria_common::Error),

    /// Cancellation observed at a page boundary
    #[error("Run cancelled")]
    Cancelled,

    /// Upstream error outside a paged walk (e.g. single-item detail fetch)
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

impl CollectError {
    /// Conditions that downgrade a run to partial instead of failing it:
    /// already-persisted items stand.
    pub fn is_partial(&self) -> bool {
        matches!(self, CollectError::FetchExhausted { .. } | CollectError::Cancelled)
    }
}
