use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A task: one DAG instance created from a `NamedTask` template with a
/// specific, schema-validated context.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, sqlx::FromRow)]
pub struct Task {
    pub task_id: Uuid,
    pub namespace: String,
    pub named_task: String,
    pub version: String,
    pub context: serde_json::Value,
    pub initiator: String,
    pub source_system: String,
    pub reason: String,
    pub created_at: NaiveDateTime,
}

impl Task {
    #[must_use]
    pub fn new(
        namespace: impl Into<String>,
        named_task: impl Into<String>,
        version: impl Into<String>,
        context: serde_json::Value,
        initiator: impl Into<String>,
        source_system: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            task_id: Uuid::now_v7(),
            namespace: namespace.into(),
            named_task: named_task.into(),
            version: version.into(),
            context,
            initiator: initiator.into(),
            source_system: source_system.into(),
            reason: reason.into(),
            created_at: chrono::Utc::now().naive_utc(),
        }
    }
}

/// The request accepted by the engine from external callers to create a
/// new task instance. Validated against the named task's context schema
/// before any step row is created.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TaskRequest {
    pub name: String,
    pub namespace: String,
    pub version: String,
    pub context: serde_json::Value,
    pub initiator: String,
    pub source_system: String,
    pub reason: String,
}
