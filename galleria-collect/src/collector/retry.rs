//! Upstream error classification and backoff
//!
//! Errors from one page fetch fall into three classes, each with its own
//! uniform backoff window. Attempt counters are local to a single page; a
//! page whose retries run out surfaces as a fetch-exhausted condition that
//! the orchestrator records as a partial run.

use crate::upstream::UpstreamError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;
use std::time::Duration;

/// Upstream error class, derived from the HTTP-status-like code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// HTTP 429 — the platform is pushing back
    RateLimited,
    /// HTTP 403 — likely anti-abuse flag; backs off longest and gives up
    /// soonest
    Forbidden,
    /// Anything else: 5xx, network, parse
    Transient,
}

/// Uniform backoff window, seconds
#[derive(Debug, Clone, Copy)]
pub struct BackoffWindow {
    pub min: f64,
    pub max: f64,
}

/// Retry tunables, re-read from settings per run
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub rate_limited: BackoffWindow,
    pub forbidden: BackoffWindow,
    pub transient: BackoffWindow,
    /// Attempts per page for rate-limited/transient errors
    pub max_attempts: u32,
    /// Lower ceiling for forbidden responses
    pub forbidden_max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            rate_limited: BackoffWindow { min: 30.0, max: 60.0 },
            forbidden: BackoffWindow { min: 60.0, max: 120.0 },
            transient: BackoffWindow { min: 10.0, max: 20.0 },
            max_attempts: 3,
            forbidden_max_attempts: 2,
        }
    }
}

/// Classifies upstream errors and draws class-specific backoffs
pub struct RetryPolicy {
    config: RetryConfig,
    rng: Mutex<StdRng>,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Seeded constructor: the backoff sequence is deterministic
    pub fn with_seed(config: RetryConfig, seed: u64) -> Self {
        Self {
            config,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn classify(&self, error: &UpstreamError) -> ErrorClass {
        match error.status() {
            Some(429) => ErrorClass::RateLimited,
            Some(403) => ErrorClass::Forbidden,
            _ => ErrorClass::Transient,
        }
    }

    /// Draw a backoff duration from the class window, inclusive bounds
    pub fn backoff_for(&self, class: ErrorClass) -> Duration {
        let window = match class {
            ErrorClass::RateLimited => self.config.rate_limited,
            ErrorClass::Forbidden => self.config.forbidden,
            ErrorClass::Transient => self.config.transient,
        };

        let (min, max) = if window.min <= window.max {
            (window.min, window.max)
        } else {
            (window.max, window.min)
        };
        let secs = if min == max {
            min
        } else {
            self.rng.lock().expect("retry rng poisoned").gen_range(min..=max)
        };
        Duration::from_secs_f64(secs.max(0.0))
    }

    /// Attempt ceiling for a class, page-local
    pub fn max_attempts(&self, class: ErrorClass) -> u32 {
        match class {
            ErrorClass::Forbidden => self.config.forbidden_max_attempts,
            _ => self.config.max_attempts,
        }
    }
}
