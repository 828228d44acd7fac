//! # Orchestration Configuration
//!
//! Configuration for the orchestration core: execution concurrency bounds,
//! backoff/retry policy, and re-enqueue delays.
//!
//! ## Configuration loading
//!
//! Configuration is loaded with the `config` crate, layered over a base
//! TOML file (`config/base.toml`) and an optional environment-specific
//! override (`config/environments/{env}.toml`), the same layering the
//! engine's ambient config stack uses elsewhere. Every field has a
//! `Default`, so the engine runs with sane behavior when no config file is
//! present at all.
//!
//! ```toml
//! [execution]
//! min_concurrent_steps = 3
//! max_concurrent_steps_limit = 12
//!
//! [backoff]
//! default_backoff_seconds = 1
//! backoff_multiplier = 2.0
//! max_backoff_seconds = 30
//! ```

pub mod auth;
pub mod backoff;
pub mod dependency_graph;
pub mod execution;
pub mod reenqueue;

pub use auth::AuthConfig;
pub use backoff::BackoffConfig;
pub use dependency_graph::DependencyGraphConfig;
pub use execution::ExecutionConfig;
pub use reenqueue::ReenqueueDelaysConfig;

use serde::{Deserialize, Serialize};

/// Top-level, immutable, process-wide configuration for the orchestration
/// core. Loaded once at startup and injected by reference/`Arc` into every
/// component; hot-reload is out of scope.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OrchestrationConfig {
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub backoff: BackoffConfig,
    /// Re-enqueue delays; grouped separately from `backoff` for clarity even
    /// though the external config surface nests these under `backoff.reenqueue_delays`.
    #[serde(default)]
    pub reenqueue_delays: ReenqueueDelaysConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub dependency_graph: DependencyGraphConfig,
}

impl OrchestrationConfig {
    /// Load configuration from `config/base.toml`, optionally overlaid with
    /// `config/environments/{env}.toml` when `env` is set, and finally with
    /// environment variables prefixed `TASKER_` (double-underscore separated
    /// for nested keys, e.g. `TASKER_EXECUTION__MIN_CONCURRENT_STEPS`).
    ///
    /// Absence of every source is not an error: defaults apply.
    pub fn load(env: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::File::with_name("config/base").required(false));

        if let Some(env) = env {
            let path = format!("config/environments/{env}");
            builder = builder.add_source(config::File::with_name(&path).required(false));
        }

        let builder = builder.add_source(
            config::Environment::with_prefix("TASKER")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}
