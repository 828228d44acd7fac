use serde::{Deserialize, Serialize};

/// Re-enqueue delays per execution-status classification, used by the
/// finalizer when a task is not yet terminal.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ReenqueueDelaysConfig {
    pub has_ready_steps_seconds: u64,
    pub processing_seconds: u64,
    pub waiting_for_dependencies_seconds: u64,
    /// Fallback delay for any execution status not covered above.
    pub default_seconds: u64,
    /// Added on top of the earliest `next_retry_at` when that deadline is
    /// sooner than `waiting_for_dependencies_seconds`.
    pub buffer_seconds: u64,
}

impl Default for ReenqueueDelaysConfig {
    fn default() -> Self {
        Self {
            has_ready_steps_seconds: 0,
            processing_seconds: 10,
            waiting_for_dependencies_seconds: 45,
            default_seconds: 30,
            buffer_seconds: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ReenqueueDelaysConfig::default();
        assert_eq!(config.has_ready_steps_seconds, 0);
        assert_eq!(config.processing_seconds, 10);
        assert_eq!(config.waiting_for_dependencies_seconds, 45);
        assert_eq!(config.default_seconds, 30);
        assert_eq!(config.buffer_seconds, 5);
    }
}
