//! Retry & Backoff Calculator.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

/// Configurable base sequence (seconds), indexed by attempt count and
/// clamped to the last entry when attempts exceed its length.
const DEFAULT_BASE_SEQUENCE_SECONDS: [i64; 6] = [1, 2, 4, 8, 16, 32];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    pub base_sequence_seconds: Vec<i64>,
    pub max_backoff_seconds: i64,
    pub jitter_factor: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_sequence_seconds: DEFAULT_BASE_SEQUENCE_SECONDS.to_vec(),
            max_backoff_seconds: 300,
            jitter_factor: 0.1,
        }
    }
}

/// Pure retry/backoff calculator. `jitter_source` is injected so tests can
/// assert exact values instead of a random range.
#[derive(Debug, Clone, Default)]
pub struct BackoffCalculator {
    config: BackoffConfig,
}

impl BackoffCalculator {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config }
    }

    /// Base backoff in seconds for `attempts`, before jitter, honoring a
    /// server-requested override when present (it takes precedence over the
    /// exponential default and is itself capped at `max_backoff_seconds`).
    pub fn base_seconds(&self, attempts: i32, server_requested: Option<i64>) -> i64 {
        if let Some(requested) = server_requested {
            return requested.clamp(0, self.config.max_backoff_seconds);
        }

        let idx = (attempts.max(1) as usize - 1).min(self.config.base_sequence_seconds.len() - 1);
        self.config.base_sequence_seconds[idx].min(self.config.max_backoff_seconds)
    }

    /// Apply ±`jitter_factor` jitter to `base_seconds` using `jitter_roll`,
    /// a value in `[-1.0, 1.0]` supplied by the caller's RNG.
    pub fn apply_jitter(&self, base_seconds: i64, jitter_roll: f64) -> i64 {
        let jitter_roll = jitter_roll.clamp(-1.0, 1.0);
        let delta = (base_seconds as f64) * self.config.jitter_factor * jitter_roll;
        (base_seconds as f64 + delta).round().max(0.0) as i64
    }

    /// Compute `next_retry_at` from `last_attempted_at` plus the jittered
    /// backoff window.
    pub fn next_retry_at(
        &self,
        last_attempted_at: DateTime<Utc>,
        attempts: i32,
        server_requested: Option<i64>,
        jitter_roll: f64,
    ) -> DateTime<Utc> {
        let base = self.base_seconds(attempts, server_requested);
        let jittered = self.apply_jitter(base, jitter_roll);
        last_attempted_at + ChronoDuration::seconds(jittered)
    }

    /// Whether `now` is past the computed retry window.
    pub fn backoff_elapsed(
        &self,
        last_attempted_at: DateTime<Utc>,
        attempts: i32,
        server_requested: Option<i64>,
        now: DateTime<Utc>,
    ) -> bool {
        // Readiness checks use the unjittered window: jitter only smooths
        // thundering-herd wakeups for independent retry schedulers, it must
        // not make `retry_eligible` itself nondeterministic.
        let base = self.base_seconds(attempts, server_requested);
        now >= last_attempted_at + ChronoDuration::seconds(base)
    }
}
