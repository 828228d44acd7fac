//! # Readiness Evaluator
//!
//! Computes, for every step of a task, whether it is eligible to execute
//! right now and why not if it isn't. Implemented as a single set-based
//! query per task (or batch of tasks) so that evaluating N steps costs
//! O(N) rows read rather than O(N) round trips; the set-based SQL lives in
//! `query`, the pure decision logic below so it can be unit-tested without
//! a database.

pub mod query;
pub mod types;

pub use types::{
    BlockingReason, ExecutionStatus, ReadinessInput, ReadinessRecord, RecommendedAction,
    TaskExecutionContext,
};

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::backoff::exp_backoff;
use crate::config::BackoffConfig;
use crate::model::ExecutionState;

/// Compute one step's readiness record from its raw persisted state.
#[must_use]
pub fn compute_readiness(
    input: &ReadinessInput,
    now: DateTime<Utc>,
    config: &BackoffConfig,
) -> ReadinessRecord {
    let dependencies_satisfied = input.total_parents == 0 || input.completed_parents == input.total_parents;

    // A step that has never run gets its first attempt regardless of
    // `retry_limit` (including `retry_limit = 0`); the limit only bounds
    // retries after a recorded failure, not the initial attempt.
    let never_attempted = input.attempts == 0 && input.current_state == ExecutionState::Pending;
    let retry_exhausted = !input.retryable || (!never_attempted && input.attempts >= input.retry_limit);

    let backoff_deadline = backoff_deadline(input, config);

    let retry_eligible = !retry_exhausted
        && match backoff_deadline {
            Some(deadline) => deadline <= now,
            // No prior failure recorded: nothing to back off from.
            None => true,
        };

    let ready_for_execution = matches!(input.current_state, ExecutionState::Pending | ExecutionState::Error)
        && dependencies_satisfied
        && retry_eligible;

    let blocking_reason = if ready_for_execution {
        None
    } else if !matches!(input.current_state, ExecutionState::Pending | ExecutionState::Error) {
        Some(BlockingReason::InvalidState)
    } else if !dependencies_satisfied {
        Some(BlockingReason::DependenciesNotSatisfied)
    } else if !retry_eligible {
        Some(BlockingReason::RetryNotEligible)
    } else {
        Some(BlockingReason::Unknown)
    };

    ReadinessRecord {
        step_id: input.step_id,
        current_state: input.current_state,
        dependencies_satisfied,
        retry_eligible,
        ready_for_execution,
        blocking_reason,
        next_retry_at: if retry_exhausted { None } else { backoff_deadline },
        total_parents: input.total_parents,
        completed_parents: input.completed_parents,
        last_attempted_at: input.last_attempted_at,
    }
}

/// `last_attempted_at + backoff_request_seconds` when the server directed a
/// specific delay; otherwise `last_failure_at + exp_backoff(attempts)`.
/// `None` when the step has never failed.
fn backoff_deadline(input: &ReadinessInput, config: &BackoffConfig) -> Option<DateTime<Utc>> {
    if let (Some(seconds), Some(last_attempted_at)) =
        (input.backoff_request_seconds, input.last_attempted_at)
    {
        return Some(last_attempted_at + chrono::Duration::seconds(seconds));
    }
    let last_failure_at = input.last_failure_at?;
    let delay = exp_backoff(input.attempts, config);
    Some(last_failure_at + chrono::Duration::milliseconds((delay * 1000.0) as i64))
}

/// Aggregate a task's per-step readiness records into its execution
/// context: counts, completion percentage, and the classification the
/// finalizer acts on.
#[must_use]
pub fn aggregate(task_id: uuid::Uuid, records: &[ReadinessRecord]) -> TaskExecutionContext {
    let total_steps = records.len() as u32;
    let mut pending = 0;
    let mut in_progress = 0;
    let mut completed = 0;
    let mut failed = 0;
    let mut ready = 0;
    let mut earliest_next_retry_at: Option<DateTime<Utc>> = None;
    let mut any_retryable_failure = false;

    for record in records {
        match record.current_state {
            ExecutionState::Pending => pending += 1,
            ExecutionState::InProgress => in_progress += 1,
            ExecutionState::Complete | ExecutionState::ResolvedManually => completed += 1,
            ExecutionState::Error => {
                failed += 1;
                if record.next_retry_at.is_some() {
                    any_retryable_failure = true;
                }
            }
            ExecutionState::Cancelled => {}
        }
        if record.ready_for_execution {
            ready += 1;
        }
        if let Some(next) = record.next_retry_at {
            earliest_next_retry_at = Some(match earliest_next_retry_at {
                Some(current) if current <= next => current,
                _ => next,
            });
        }
    }

    let completion_percentage = if total_steps == 0 {
        100.0
    } else {
        (completed as f64 / total_steps as f64) * 100.0
    };

    let execution_status = if total_steps == 0 || completed == total_steps {
        ExecutionStatus::AllComplete
    } else if failed > 0 && !any_retryable_failure && ready == 0 && in_progress == 0 {
        ExecutionStatus::BlockedByFailures
    } else if ready > 0 {
        ExecutionStatus::HasReadySteps
    } else if in_progress > 0 {
        ExecutionStatus::Processing
    } else {
        ExecutionStatus::WaitingForDependencies
    };

    let recommended_action = match execution_status {
        ExecutionStatus::AllComplete => RecommendedAction::FinalizeTask,
        ExecutionStatus::BlockedByFailures => RecommendedAction::HandleFailures,
        ExecutionStatus::HasReadySteps => RecommendedAction::ExecuteReadySteps,
        ExecutionStatus::Processing => RecommendedAction::WaitForCompletion,
        ExecutionStatus::WaitingForDependencies => RecommendedAction::WaitForDependencies,
    };

    TaskExecutionContext {
        task_id,
        total_steps,
        pending,
        in_progress,
        completed,
        failed,
        ready,
        completion_percentage,
        execution_status,
        recommended_action,
        earliest_next_retry_at,
    }
}

/// Thin async wrapper around the set-based persistence query plus the pure
/// decision logic above.
#[derive(Debug)]
pub struct ReadinessEvaluator {
    pool: Arc<sqlx::PgPool>,
    backoff_config: BackoffConfig,
}

impl ReadinessEvaluator {
    #[must_use]
    pub fn new(pool: Arc<sqlx::PgPool>, backoff_config: BackoffConfig) -> Self {
        Self { pool, backoff_config }
    }

    pub async fn readiness(&self, task_id: uuid::Uuid) -> crate::error::OrchestrationResult<Vec<ReadinessRecord>> {
        let now = Utc::now();
        let rows = query::fetch_readiness_inputs(&self.pool, task_id).await?;
        Ok(rows
            .iter()
            .map(|row| compute_readiness(row, now, &self.backoff_config))
            .collect())
    }

    pub async fn readiness_batch(
        &self,
        task_ids: &[uuid::Uuid],
    ) -> crate::error::OrchestrationResult<std::collections::HashMap<uuid::Uuid, Vec<ReadinessRecord>>> {
        let now = Utc::now();
        let rows = query::fetch_readiness_inputs_batch(&self.pool, task_ids).await?;
        let mut grouped: std::collections::HashMap<uuid::Uuid, Vec<ReadinessRecord>> =
            std::collections::HashMap::new();
        for row in &rows {
            grouped
                .entry(row.task_id)
                .or_default()
                .push(compute_readiness(row, now, &self.backoff_config));
        }
        Ok(grouped)
    }

    pub async fn execution_context(
        &self,
        task_id: uuid::Uuid,
    ) -> crate::error::OrchestrationResult<TaskExecutionContext> {
        let records = self.readiness(task_id).await?;
        Ok(aggregate(task_id, &records))
    }
}
