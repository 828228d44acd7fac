use serde::{Deserialize, Serialize};

/// Retry/backoff policy parameters.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct BackoffConfig {
    /// Base delay (seconds) for exponential backoff, `exp_backoff(0)`.
    pub default_backoff_seconds: u64,
    /// Growth multiplier `b` in `base * b^n`.
    pub backoff_multiplier: f64,
    /// Ceiling on the computed backoff delay before jitter.
    pub max_backoff_seconds: u64,
    /// Whether to apply deterministic jitter to the computed delay.
    pub jitter_enabled: bool,
    /// Maximum jitter magnitude, as a fraction of the computed delay (0.10 = ±10%).
    pub jitter_max_percentage: f64,
    /// Bound on how many times a storage conflict is retried before
    /// escalating to a retryable error.
    pub storage_conflict_retry_limit: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            default_backoff_seconds: 1,
            backoff_multiplier: 2.0,
            max_backoff_seconds: 30,
            jitter_enabled: true,
            jitter_max_percentage: 0.10,
            storage_conflict_retry_limit: 3,
        }
    }
}
