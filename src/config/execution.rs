use serde::{Deserialize, Serialize};

/// Bounds and timeouts for the bounded-concurrency step executor.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Floor on the computed worker pool size.
    pub min_concurrent_steps: usize,
    /// Ceiling on the computed worker pool size.
    pub max_concurrent_steps_limit: usize,
    /// How long a computed pool size is cached before being recomputed.
    pub concurrency_cache_duration_seconds: u64,
    /// Fixed component of the per-batch timeout.
    pub batch_timeout_base_seconds: u64,
    /// Per-step component of the per-batch timeout.
    pub batch_timeout_per_step_seconds: u64,
    /// Ceiling on the per-batch timeout regardless of batch size.
    pub max_batch_timeout_seconds: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            min_concurrent_steps: 3,
            max_concurrent_steps_limit: 12,
            concurrency_cache_duration_seconds: 30,
            batch_timeout_base_seconds: 30,
            batch_timeout_per_step_seconds: 5,
            max_batch_timeout_seconds: 120,
        }
    }
}

impl ExecutionConfig {
    /// Compute the per-batch timeout for a batch of `batch_size` steps:
    /// `min(base + per_step * n, cap)`.
    #[must_use]
    pub fn batch_timeout(&self, batch_size: usize) -> std::time::Duration {
        let computed =
            self.batch_timeout_base_seconds + self.batch_timeout_per_step_seconds * batch_size as u64;
        std::time::Duration::from_secs(computed.min(self.max_batch_timeout_seconds))
    }

    /// Clamp a proposed worker pool size into `[min_concurrent_steps,
    /// max_concurrent_steps_limit]`.
    #[must_use]
    pub fn clamp_pool_size(&self, proposed: usize) -> usize {
        proposed.clamp(self.min_concurrent_steps, self.max_concurrent_steps_limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_timeout_uses_defaults() {
        let config = ExecutionConfig::default();
        assert_eq!(config.batch_timeout(1).as_secs(), 35);
        assert_eq!(config.batch_timeout(10).as_secs(), 80);
    }

    #[test]
    fn batch_timeout_caps_at_max() {
        let config = ExecutionConfig::default();
        assert_eq!(config.batch_timeout(1000).as_secs(), 120);
    }

    #[test]
    fn clamp_pool_size_respects_bounds() {
        let config = ExecutionConfig::default();
        assert_eq!(config.clamp_pool_size(1), 3);
        assert_eq!(config.clamp_pool_size(7), 7);
        assert_eq!(config.clamp_pool_size(50), 12);
    }
}
