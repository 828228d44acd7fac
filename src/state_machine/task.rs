//! # Task State Machine
//!
//! Same shape as the step state machine: an explicit transition table and
//! one business guard (`COMPLETE` requires every step to have reached a
//! terminal-success or error state). Task transitions additionally depend
//! on aggregate step state rather than on the task row alone.

use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::events::task_transition_event;
use crate::error::{OrchestrationError, OrchestrationResult};
use crate::model::ExecutionState;

#[must_use]
pub fn is_allowed_transition(from: ExecutionState, to: ExecutionState) -> bool {
    use ExecutionState::{Cancelled, Complete, Error, InProgress, Pending, ResolvedManually};
    match from {
        Pending => matches!(to, InProgress | Cancelled | Error),
        InProgress => matches!(to, Complete | Error | Cancelled | Pending),
        Error => matches!(to, Pending | ResolvedManually),
        Complete => matches!(to, Cancelled),
        ResolvedManually => matches!(to, Cancelled),
        Cancelled => false,
    }
}

/// `COMPLETE` is permitted only when no step remains in
/// `{PENDING, IN_PROGRESS, ERROR}`.
#[must_use]
pub fn complete_guard_satisfied(to: ExecutionState, steps_outstanding: u32) -> bool {
    to != ExecutionState::Complete || steps_outstanding == 0
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    Applied(Option<ExecutionState>, ExecutionState),
    Idempotent,
}

pub fn validate(
    current: Option<ExecutionState>,
    to: ExecutionState,
    steps_outstanding: u32,
) -> OrchestrationResult<(TransitionOutcome, Option<&'static str>)> {
    let from = current.unwrap_or(ExecutionState::Pending);

    if from == to {
        return Ok((TransitionOutcome::Idempotent, None));
    }

    if !is_allowed_transition(from, to) {
        return Err(OrchestrationError::guard_failed(
            from.as_str(),
            to.as_str(),
            "not a structurally legal transition",
        ));
    }

    if !complete_guard_satisfied(to, steps_outstanding) {
        return Err(OrchestrationError::guard_failed(
            from.as_str(),
            to.as_str(),
            "steps remain outstanding",
        ));
    }

    let event = task_transition_event(current, to);
    Ok((TransitionOutcome::Applied(current, to), event))
}

pub async fn append_transition(
    pool: &PgPool,
    task_id: Uuid,
    to: ExecutionState,
    metadata: serde_json::Value,
    steps_outstanding: u32,
    retry_limit: u32,
) -> OrchestrationResult<TransitionOutcome> {
    for attempt in 0..=retry_limit {
        let current = fetch_current_state(pool, task_id).await?;
        let (outcome, _event) = validate(current, to, steps_outstanding)?;

        if matches!(outcome, TransitionOutcome::Idempotent) {
            return Ok(outcome);
        }

        let mut tx = pool.begin().await?;
        sqlx::query(
            "update task_transitions set most_recent = false where task_id = $1 and most_recent = true",
        )
        .bind(task_id)
        .execute(&mut *tx)
        .await?;

        let next_sort_key: i64 = sqlx::query_scalar(
            "select coalesce(max(sort_key), 0) + 1 from task_transitions where task_id = $1",
        )
        .bind(task_id)
        .fetch_one(&mut *tx)
        .await?;

        let insert = sqlx::query(
            "insert into task_transitions \
             (task_id, from_state, to_state, metadata, sort_key, most_recent, created_at) \
             values ($1, $2, $3, $4, $5, true, now())",
        )
        .bind(task_id)
        .bind(current.map(ExecutionState::as_str))
        .bind(to.as_str())
        .bind(&metadata)
        .bind(next_sort_key)
        .execute(&mut *tx)
        .await;

        match insert {
            Ok(_) => {
                tx.commit().await?;
                return Ok(outcome);
            }
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                tx.rollback().await?;
                tracing::warn!(task_id = %task_id, attempt, "storage conflict on task transition, retrying");
                continue;
            }
            Err(other) => return Err(other.into()),
        }
    }

    Err(OrchestrationError::retryable(format!(
        "task {task_id} transition to {to} lost {retry_limit} consecutive storage races"
    )))
}

async fn fetch_current_state(pool: &PgPool, task_id: Uuid) -> OrchestrationResult<Option<ExecutionState>> {
    let row = sqlx::query("select to_state from task_transitions where task_id = $1 and most_recent = true")
        .bind(task_id)
        .fetch_optional(pool)
        .await?;
    match row {
        Some(row) => {
            let raw: String = row.try_get("to_state")?;
            Ok(Some(parse_state(&raw)?))
        }
        None => Ok(None),
    }
}

fn parse_state(raw: &str) -> OrchestrationResult<ExecutionState> {
    Ok(match raw {
        "PENDING" => ExecutionState::Pending,
        "IN_PROGRESS" => ExecutionState::InProgress,
        "COMPLETE" => ExecutionState::Complete,
        "ERROR" => ExecutionState::Error,
        "CANCELLED" => ExecutionState::Cancelled,
        "RESOLVED_MANUALLY" => ExecutionState::ResolvedManually,
        other => {
            return Err(OrchestrationError::ConfigurationError(format!(
                "unrecognized task state in storage: {other}"
            )))
        }
    })
}
