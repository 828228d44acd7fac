//! Connection pooling and migration wiring shared by every persistence-
//! touching module in the crate.

use sqlx::postgres::{PgPoolOptions, PgPool};

/// Embedded migrator, used both by production startup and by
/// `#[sqlx::test(migrator = "crate::database::MIGRATOR")]` in integration
/// tests.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Open a connection pool against `database_url`, sized for one
/// orchestration-core process. `max_connections` should comfortably exceed
/// `ExecutionConfig::max_concurrent_steps_limit` so a full worker batch
/// never starves on pool checkout.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}
