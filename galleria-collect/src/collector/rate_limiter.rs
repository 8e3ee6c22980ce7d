//! Inter-request throttle
//!
//! Every upstream call waits a duration drawn uniformly from a configured
//! window, and every `batch_size` calls a longer pause is inserted. The
//! randomness avoids a detectable fixed cadence. Delay computation is split
//! from sleeping so tests can seed the RNG and assert exact windows.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

/// Throttle tunables, re-read from settings per run
#[derive(Debug, Clone)]
pub struct ThrottleConfig {
    /// Uniform delay window before each call, seconds
    pub delay_min: f64,
    pub delay_max: f64,
    /// Insert a long pause after this many calls
    pub batch_size: u32,
    /// Uniform long-pause window, seconds
    pub batch_pause_min: f64,
    pub batch_pause_max: f64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            delay_min: 1.0,
            delay_max: 10.0,
            batch_size: 5,
            batch_pause_min: 5.0,
            batch_pause_max: 15.0,
        }
    }
}

/// Randomized inter-request delay enforcement
pub struct RateLimiter {
    config: ThrottleConfig,
    rng: Mutex<StdRng>,
}

impl RateLimiter {
    pub fn new(config: ThrottleConfig) -> Self {
        Self {
            config,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Seeded constructor: the delay sequence is deterministic
    pub fn with_seed(config: ThrottleConfig, seed: u64) -> Self {
        Self {
            config,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Compute the next per-call delay without sleeping
    pub fn next_delay(&self) -> Duration {
        self.draw(self.config.delay_min, self.config.delay_max)
    }

    /// Compute the next batch pause without sleeping
    pub fn next_batch_pause(&self) -> Duration {
        self.draw(self.config.batch_pause_min, self.config.batch_pause_max)
    }

    /// Sleep the per-call delay
    pub async fn wait(&self) {
        let delay = self.next_delay();
        debug!(delay_ms = delay.as_millis() as u64, "Throttle: waiting before upstream call");
        tokio::time::sleep(delay).await;
    }

    /// Sleep the long pause when `count` completes a batch.
    ///
    /// Returns true when a pause was taken.
    pub async fn batch_pause(&self, count: u32) -> bool {
        if self.config.batch_size == 0 || count == 0 || count % self.config.batch_size != 0 {
            return false;
        }

        let pause = self.next_batch_pause();
        info!(
            calls = count,
            pause_ms = pause.as_millis() as u64,
            "Throttle: batch pause"
        );
        tokio::time::sleep(pause).await;
        true
    }

    fn draw(&self, min: f64, max: f64) -> Duration {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        let secs = if min == max {
            min
        } else {
            self.rng.lock().expect("throttle rng poisoned").gen_range(min..=max)
        };
        Duration::from_secs_f64(secs.max(0.0))
    }
}
