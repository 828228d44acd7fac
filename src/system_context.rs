//! The shared handle every orchestration component is built from: one
//! connection pool, the process's own identity, and the loaded config.
//! Construct once at startup and pass `Arc<SystemContext>` down rather than
//! threading the pool and config through every constructor separately.

use std::sync::Arc;

use sqlx::PgPool;
use uuid::Uuid;

use crate::config::OrchestrationConfig;
use crate::event_bus::EventBus;

/// Process-wide orchestration state. Cheap to clone (it's an `Arc` of this
/// that gets passed around), and never mutated after construction.
#[derive(Debug)]
pub struct SystemContext {
    pub db_pool: PgPool,
    pub config: OrchestrationConfig,
    pub event_bus: Arc<EventBus>,
    /// Identifies this process in logs and in any future distributed
    /// claim/lease scheme; generated fresh on every startup.
    pub processor_uuid: Uuid,
}

impl SystemContext {
    #[must_use]
    pub fn new(db_pool: PgPool, config: OrchestrationConfig) -> Self {
        Self {
            db_pool,
            config,
            event_bus: Arc::new(EventBus::new()),
            processor_uuid: Uuid::now_v7(),
        }
    }

    /// Build a `SystemContext` by connecting to `database_url` and loading
    /// configuration for `env` (see `OrchestrationConfig::load`).
    pub async fn bootstrap(database_url: &str, env: Option<&str>) -> Result<Self, crate::error::OrchestrationError> {
        let config = OrchestrationConfig::load(env)
            .map_err(|e| crate::error::OrchestrationError::ConfigurationError(e.to_string()))?;
        let max_connections = config.execution.max_concurrent_steps_limit as u32 + 2;
        let db_pool = crate::database::connect(database_url, max_connections).await?;
        Ok(Self::new(db_pool, config))
    }
}
