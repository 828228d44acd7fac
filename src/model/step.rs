use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A step instance within one task's DAG.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, sqlx::FromRow)]
pub struct WorkflowStep {
    pub step_id: Uuid,
    pub task_id: Uuid,
    pub named_step: String,
    pub attempts: i32,
    pub retry_limit: i32,
    pub retryable: bool,
    pub last_attempted_at: Option<NaiveDateTime>,
    pub last_failure_at: Option<NaiveDateTime>,
    /// Server-directed backoff override carried by a `RetryableError`.
    pub backoff_request_seconds: Option<i64>,
    pub results: Option<serde_json::Value>,
}

impl WorkflowStep {
    #[must_use]
    pub fn new(task_id: Uuid, named_step: impl Into<String>, retry_limit: i32, retryable: bool) -> Self {
        Self {
            step_id: Uuid::now_v7(),
            task_id,
            named_step: named_step.into(),
            attempts: 0,
            retry_limit,
            retryable,
            last_attempted_at: None,
            last_failure_at: None,
            backoff_request_seconds: None,
            results: None,
        }
    }

    /// `attempts >= retry_limit`, or the step was marked non-retryable by a
    /// permanent error. Retry-exhausted steps are never `retry_eligible`.
    #[must_use]
    pub fn retry_exhausted(&self) -> bool {
        !self.retryable || self.attempts >= self.retry_limit
    }

    pub fn record_attempt(&mut self) {
        self.attempts += 1;
        self.last_attempted_at = Some(Utc::now().naive_utc());
    }

    pub fn record_failure(&mut self, backoff_request_seconds: Option<i64>) {
        self.last_failure_at = Some(Utc::now().naive_utc());
        self.backoff_request_seconds = backoff_request_seconds;
    }

    pub fn mark_permanently_failed(&mut self) {
        self.retryable = false;
    }
}

/// A directed edge `from_step -> to_step` within one task's DAG.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, sqlx::FromRow)]
pub struct StepEdge {
    pub task_id: Uuid,
    pub from_step: String,
    pub to_step: String,
    pub edge_type: String,
}
