//! The narrow interface user-supplied step handlers implement, and the
//! read-only view of sibling results they receive.

use async_trait::async_trait;
use uuid::Uuid;

use crate::model::{Task, WorkflowStep};

/// A read-only view of a task's steps and their recorded results, handed to
/// a handler so it can consult sibling output without the engine shuffling
/// data between steps on its behalf.
#[derive(Debug, Clone)]
pub struct Sequence {
    steps: Vec<WorkflowStep>,
}

impl Sequence {
    #[must_use]
    pub fn new(steps: Vec<WorkflowStep>) -> Self {
        Self { steps }
    }

    #[must_use]
    pub fn find_step_by_name(&self, name: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.named_step == name)
    }

    #[must_use]
    pub fn steps(&self) -> &[WorkflowStep] {
        &self.steps
    }
}

/// Classifies a handler failure as transient (worth retrying, subject to
/// backoff) or permanent (retry-exhausting regardless of `attempts`).
#[derive(Debug, Clone)]
pub enum HandlerError {
    /// Transient; `retry_after` optionally overrides the computed backoff.
    Retryable { message: String, retry_after: Option<u64> },
    /// Disables further retries for this step regardless of `attempts`.
    Permanent { message: String, error_code: String },
}

impl HandlerError {
    #[must_use]
    pub fn retryable(message: impl Into<String>) -> Self {
        Self::Retryable {
            message: message.into(),
            retry_after: None,
        }
    }

    #[must_use]
    pub fn retryable_after(message: impl Into<String>, retry_after: u64) -> Self {
        Self::Retryable {
            message: message.into(),
            retry_after: Some(retry_after),
        }
    }

    #[must_use]
    pub fn permanent(message: impl Into<String>, error_code: impl Into<String>) -> Self {
        Self::Permanent {
            message: message.into(),
            error_code: error_code.into(),
        }
    }
}

impl From<HandlerError> for crate::error::OrchestrationError {
    fn from(value: HandlerError) -> Self {
        match value {
            HandlerError::Retryable { message, retry_after } => match retry_after {
                Some(seconds) => crate::error::OrchestrationError::retryable_after(message, seconds),
                None => crate::error::OrchestrationError::retryable(message),
            },
            HandlerError::Permanent { message, error_code } => {
                crate::error::OrchestrationError::permanent(message, error_code)
            }
        }
    }
}

/// The interface every concrete step handler implements. Handlers are
/// registered in a map keyed by `(namespace, name, version, step_name)` at
/// startup; there is no dynamic class lookup by name.
#[async_trait]
pub trait StepHandler: Send + Sync {
    /// Run the step's business logic. `attempt_number` lets an idempotent
    /// handler detect a duplicate invocation of the same logical attempt.
    async fn process(
        &self,
        task: &Task,
        sequence: &Sequence,
        step: &WorkflowStep,
        attempt_number: u32,
    ) -> Result<serde_json::Value, HandlerError>;

    /// Optional post-processing hook: receives the handler's raw return
    /// value and the step's context, and returns the canonical value to
    /// persist as `step.results`. Defaults to passing the raw value
    /// through unchanged.
    fn process_results(&self, _step_id: Uuid, raw: serde_json::Value) -> serde_json::Value {
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_step(name: &str) -> WorkflowStep {
        WorkflowStep::new(Uuid::now_v7(), name, 3, true)
    }

    #[test]
    fn sequence_finds_step_by_name() {
        let sequence = Sequence::new(vec![sample_step("validate"), sample_step("charge")]);
        assert!(sequence.find_step_by_name("charge").is_some());
        assert!(sequence.find_step_by_name("missing").is_none());
    }

    #[test]
    fn handler_error_retryable_converts_to_orchestration_error() {
        let err: crate::error::OrchestrationError = HandlerError::retryable_after("timeout", 5).into();
        assert_eq!(err.retry_after(), Some(5));
        assert!(err.is_recoverable());
    }

    #[test]
    fn handler_error_permanent_converts_to_orchestration_error() {
        let err: crate::error::OrchestrationError = HandlerError::permanent("bad card", "CARD_DECLINED").into();
        assert!(!err.is_recoverable());
        assert_eq!(format!("{err}"), "permanent error [CARD_DECLINED]: bad card");
    }
}
