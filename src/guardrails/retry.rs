//! Exponential backoff with jitter (spec §4.4.4).

use crate::config::RetryConfig;
use crate::errors::FailureMode;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

/// Deterministic std-hashing jitter sample in `[0, 1)`, seeded from the
/// trace id and attempt number. Repeated retries within one trace land on
/// different samples (the attempt number is hashed in); replaying the same
/// trace/attempt pair reproduces the same sample, which keeps failure
/// investigations replayable without a dependency on a real RNG.
pub fn sample_jitter(trace_id: &str, attempt: u32) -> f64 {
    let mut hasher = DefaultHasher::new();
    trace_id.hash(&mut hasher);
    attempt.hash(&mut hasher);
    let bits = hasher.finish();
    (bits >> 11) as f64 / (1u64 << 53) as f64
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub jitter: f64,
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(cfg: &RetryConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts,
            initial_delay: Duration::from_millis(cfg.initial_delay_ms),
            max_delay: Duration::from_millis(cfg.max_delay_ms),
            multiplier: cfg.multiplier,
            jitter: cfg.jitter,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn should_retry(&self, mode: FailureMode, attempt: u32) -> bool {
        mode.retryable() && attempt < self.max_attempts
    }

    /// `delay_n = min(max_delay, initial_delay * multiplier^n) * (1 ± jitter)`.
    /// `jitter_sample` is a caller-supplied value in `[0, 1)` — production
    /// callers pass `sample_jitter(trace_id, attempt)`, tests pass a fixed
    /// value to pin an exact delay.
    pub fn delay_for_attempt(&self, attempt: u32, jitter_sample: f64) -> Duration {
        let base_ms = self.initial_delay.as_millis() as f64 * self.multiplier.powi(attempt as i32);
        let capped_ms = base_ms.min(self.max_delay.as_millis() as f64);
        let jitter_factor = 1.0 + (jitter_sample * 2.0 - 1.0) * self.jitter;
        Duration::from_millis((capped_ms * jitter_factor).max(0.0) as u64)
    }
}
