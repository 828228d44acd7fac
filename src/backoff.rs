//! Exponential backoff with deterministic, per-(task, step) jitter.
//!
//! Jitter is keyed by `(task_id, step_id)` rather than drawn from a global
//! RNG so that the same pair of identifiers always produces the same
//! jittered delay: readiness evaluation is a query, and a query run twice
//! against unchanged state should not disagree with itself.

use std::hash::{Hash, Hasher};
use uuid::Uuid;

use crate::config::BackoffConfig;

/// `min(base * multiplier^attempts, cap)`, before jitter.
#[must_use]
pub fn exp_backoff(attempts: u32, config: &BackoffConfig) -> f64 {
    let base = config.default_backoff_seconds as f64;
    let raw = base * config.backoff_multiplier.powi(attempts as i32);
    raw.min(config.max_backoff_seconds as f64)
}

/// Deterministic jitter fraction in `[-jitter_max_percentage,
/// +jitter_max_percentage]`, seeded from `(task_id, step_id)`.
fn jitter_fraction(task_id: Uuid, step_id: Uuid, config: &BackoffConfig) -> f64 {
    if !config.jitter_enabled || config.jitter_max_percentage <= 0.0 {
        return 0.0;
    }
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    task_id.hash(&mut hasher);
    step_id.hash(&mut hasher);
    let seed = hasher.finish();

    let rng = fastrand::Rng::with_seed(seed);
    // `rng.f64()` is in [0, 1); remap to [-max, +max].
    (rng.f64() * 2.0 - 1.0) * config.jitter_max_percentage
}

/// The full backoff computation: exponential delay plus deterministic
/// jitter, expressed in seconds.
#[must_use]
pub fn backoff_seconds(attempts: u32, task_id: Uuid, step_id: Uuid, config: &BackoffConfig) -> f64 {
    let base = exp_backoff(attempts, config);
    let jitter = jitter_fraction(task_id, step_id, config);
    (base + base * jitter).max(0.0)
}
