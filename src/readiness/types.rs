use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::ExecutionState;

/// Raw per-step data as read from the persisted schema; the input to
/// `compute_readiness`. One row per step, produced by a single set-based
/// query per task (or batch of tasks).
#[derive(Debug, Clone, PartialEq)]
pub struct ReadinessInput {
    pub step_id: Uuid,
    pub task_id: Uuid,
    pub current_state: ExecutionState,
    pub attempts: u32,
    pub retry_limit: u32,
    pub retryable: bool,
    pub last_attempted_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub backoff_request_seconds: Option<i64>,
    pub total_parents: u32,
    /// Parents currently in {COMPLETE, RESOLVED_MANUALLY}.
    pub completed_parents: u32,
}

/// Why a step is not `ready_for_execution`, returned on request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockingReason {
    DependenciesNotSatisfied,
    RetryNotEligible,
    InvalidState,
    Unknown,
}

impl BlockingReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DependenciesNotSatisfied => "dependencies_not_satisfied",
            Self::RetryNotEligible => "retry_not_eligible",
            Self::InvalidState => "invalid_state",
            Self::Unknown => "unknown",
        }
    }
}

/// One per-step readiness record: whether the step may execute now, and
/// why not if it may not.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadinessRecord {
    pub step_id: Uuid,
    pub current_state: ExecutionState,
    pub dependencies_satisfied: bool,
    pub retry_eligible: bool,
    pub ready_for_execution: bool,
    pub blocking_reason: Option<BlockingReason>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub total_parents: u32,
    pub completed_parents: u32,
    pub last_attempted_at: Option<DateTime<Utc>>,
}

/// The classification of a task's overall execution state, derived from
/// the aggregate of its steps' readiness records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    HasReadySteps,
    Processing,
    BlockedByFailures,
    AllComplete,
    WaitingForDependencies,
}

/// The action the finalizer should take for a given `ExecutionStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecommendedAction {
    ExecuteReadySteps,
    WaitForCompletion,
    HandleFailures,
    FinalizeTask,
    WaitForDependencies,
}

/// Aggregate execution context for one task, computed from its steps'
/// readiness records.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskExecutionContext {
    pub task_id: Uuid,
    pub total_steps: u32,
    pub pending: u32,
    pub in_progress: u32,
    pub completed: u32,
    pub failed: u32,
    pub ready: u32,
    pub completion_percentage: f64,
    pub execution_status: ExecutionStatus,
    pub recommended_action: RecommendedAction,
    /// Earliest `next_retry_at` across all not-yet-ready steps, if any are
    /// still retry-eligible in the future.
    pub earliest_next_retry_at: Option<DateTime<Utc>>,
}
