//! Transition → event name mapping and the event payload shape published
//! on every non-idempotent transition.
//!
//! The event catalog is a single Rust `const` table compiled into the
//! binary (see `crate::event_bus::CATALOG`) rather than loaded from a
//! config file with a hard-coded fallback: this crate picked one canonical
//! representation up front, eliminating the divergence the two-sources
//! design raised as a risk.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::ExecutionState;

/// Map a step transition to the event name it publishes, if any.
/// Unmapped transitions are legal but emit no event (callers should log a
/// warning when this returns `None` for a transition they didn't expect).
#[must_use]
pub fn step_transition_event(from: Option<ExecutionState>, to: ExecutionState) -> Option<&'static str> {
    use ExecutionState::{Cancelled, Complete, Error, InProgress, Pending, ResolvedManually};
    match (from, to) {
        (Some(Pending), InProgress) => Some("step.execution_requested"),
        (Some(InProgress), Complete) => Some("step.completed"),
        (_, Error) => Some("step.failed"),
        (Some(Error), Pending) => Some("step.retry_requested"),
        (_, Cancelled) => Some("step.cancelled"),
        (_, ResolvedManually) => Some("step.resolved_manually"),
        _ => None,
    }
}

/// Map a task transition to the event name it publishes, if any.
#[must_use]
pub fn task_transition_event(from: Option<ExecutionState>, to: ExecutionState) -> Option<&'static str> {
    use ExecutionState::{Cancelled, Complete, Error, InProgress, Pending, ResolvedManually};
    match (from, to) {
        (Some(Pending), InProgress) => Some("task.execution_started"),
        (_, Complete) => Some("task.completed"),
        (_, Error) => Some("task.failed"),
        (Some(Error), Pending) => Some("task.retry_requested"),
        (_, Cancelled) => Some("task.cancelled"),
        (_, ResolvedManually) => Some("task.resolved_manually"),
        _ => None,
    }
}

/// The event payload published alongside a step transition. Missing timing
/// fields default to `transitioned_at`, centralizing the defaulting logic
/// rather than leaving each publisher to invent its own fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepEventPayload {
    pub task_id: Uuid,
    pub step_id: Uuid,
    pub step_name: String,
    pub from_state: Option<ExecutionState>,
    pub to_state: ExecutionState,
    pub transitioned_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub execution_duration_ms: i64,
    pub attempt_number: u32,
    pub error_message: Option<String>,
    pub exception_class: Option<String>,
}

/// Builds a `StepEventPayload`, defaulting unset timing fields to
/// `transitioned_at` and zero duration, the way the event payload
/// construction in the engine's lifecycle layer does.
#[derive(Debug, Clone)]
pub struct StepEventPayloadBuilder {
    task_id: Uuid,
    step_id: Uuid,
    step_name: String,
    from_state: Option<ExecutionState>,
    to_state: ExecutionState,
    transitioned_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    attempt_number: u32,
    error_message: Option<String>,
    exception_class: Option<String>,
}

impl StepEventPayloadBuilder {
    #[must_use]
    pub fn new(
        task_id: Uuid,
        step_id: Uuid,
        step_name: impl Into<String>,
        from_state: Option<ExecutionState>,
        to_state: ExecutionState,
        attempt_number: u32,
    ) -> Self {
        Self {
            task_id,
            step_id,
            step_name: step_name.into(),
            from_state,
            to_state,
            transitioned_at: Utc::now(),
            started_at: None,
            completed_at: None,
            attempt_number,
            error_message: None,
            exception_class: None,
        }
    }

    #[must_use]
    pub fn started_at(mut self, at: DateTime<Utc>) -> Self {
        self.started_at = Some(at);
        self
    }

    #[must_use]
    pub fn completed_at(mut self, at: DateTime<Utc>) -> Self {
        self.completed_at = Some(at);
        self
    }

    #[must_use]
    pub fn error(mut self, message: impl Into<String>, exception_class: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self.exception_class = Some(exception_class.into());
        self
    }

    #[must_use]
    pub fn build(self) -> StepEventPayload {
        let started_at = self.started_at.unwrap_or(self.transitioned_at);
        let completed_at = self.completed_at.unwrap_or(self.transitioned_at);
        let execution_duration_ms = (completed_at - started_at).num_milliseconds().max(0);
        StepEventPayload {
            task_id: self.task_id,
            step_id: self.step_id,
            step_name: self.step_name,
            from_state: self.from_state,
            to_state: self.to_state,
            transitioned_at: self.transitioned_at,
            started_at,
            completed_at,
            execution_duration_ms,
            attempt_number: self.attempt_number,
            error_message: self.error_message,
            exception_class: self.exception_class,
        }
    }
}
