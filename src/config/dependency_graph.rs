use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Tuning knobs the graph analyzer uses to turn structural findings
/// (orphan steps, long chains, missing duration estimates) into a single
/// impact score, and to estimate a template's critical-path duration.
///
/// Unlike the other config groups, none of these weights change whether a
/// template is legal — only `registry::graph::analyze`'s cycle/unknown-
/// dependency checks do that. This group is advisory: `impact_score`
/// crossing `threshold` is surfaced in the `GraphReport` for a caller to
/// act on (e.g. log a warning at registration time), never a registration
/// failure.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct DependencyGraphConfig {
    /// Weight applied per orphan step (a step with no dependencies and no
    /// dependents in a template with more than one step).
    pub orphan_step_impact: f64,
    /// Weight applied per level of dependency depth beyond
    /// `deep_chain_level_allowance`, penalizing very long critical paths.
    pub deep_chain_penalty: f64,
    /// Number of levels a template may have before `deep_chain_penalty`
    /// starts accruing.
    pub deep_chain_level_allowance: usize,
    /// Multiplier applied to the combined orphan/depth impact score before
    /// comparing it against `threshold`.
    pub severity_multiplier: f64,
    /// `impact_score` at or above this value marks the template as
    /// worth a second look (`GraphReport::exceeds_impact_threshold`).
    pub threshold: f64,
    /// Per-step-name estimated handler duration in seconds, used to
    /// estimate a template's critical-path duration. Steps with no entry
    /// contribute `default_duration_estimate_seconds`.
    pub duration_estimates: HashMap<String, f64>,
    /// Fallback per-step duration estimate for steps absent from
    /// `duration_estimates`.
    pub default_duration_estimate_seconds: f64,
}

impl Default for DependencyGraphConfig {
    fn default() -> Self {
        Self {
            orphan_step_impact: 1.0,
            deep_chain_penalty: 0.5,
            deep_chain_level_allowance: 5,
            severity_multiplier: 1.0,
            threshold: 5.0,
            duration_estimates: HashMap::new(),
            default_duration_estimate_seconds: 1.0,
        }
    }
}

impl DependencyGraphConfig {
    /// The estimated handler duration for `step_name`: its entry in
    /// `duration_estimates`, or `default_duration_estimate_seconds`.
    #[must_use]
    pub fn duration_estimate(&self, step_name: &str) -> f64 {
        self.duration_estimates
            .get(step_name)
            .copied()
            .unwrap_or(self.default_duration_estimate_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_estimate_falls_back_to_default() {
        let config = DependencyGraphConfig::default();
        assert_eq!(config.duration_estimate("unknown"), 1.0);
    }

    #[test]
    fn duration_estimate_uses_configured_value_when_present() {
        let mut config = DependencyGraphConfig::default();
        config.duration_estimates.insert("charge".to_string(), 12.5);
        assert_eq!(config.duration_estimate("charge"), 12.5);
    }
}
