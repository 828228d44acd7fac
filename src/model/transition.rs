use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ExecutionState;

/// One append-only row in a step's transition log.
///
/// `from_state` is `None` only for the very first transition of a step
/// (the implicit initial `PENDING` has no predecessor row). `sort_key` is
/// strictly monotonic per `step_id`; the row with the maximum `sort_key`
/// for a given step is the one with `most_recent = true`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, sqlx::FromRow)]
pub struct StepTransition {
    pub step_id: Uuid,
    pub from_state: Option<ExecutionState>,
    pub to_state: ExecutionState,
    pub metadata: serde_json::Value,
    pub sort_key: i64,
    pub most_recent: bool,
    pub created_at: NaiveDateTime,
}

/// One append-only row in a task's transition log. Same invariants as
/// `StepTransition`, keyed by `task_id`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, sqlx::FromRow)]
pub struct TaskTransition {
    pub task_id: Uuid,
    pub from_state: Option<ExecutionState>,
    pub to_state: ExecutionState,
    pub metadata: serde_json::Value,
    pub sort_key: i64,
    pub most_recent: bool,
    pub created_at: NaiveDateTime,
}
