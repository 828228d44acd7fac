//! # Step State Machine
//!
//! An explicit transition table plus one guard function, not a
//! state-machine crate: the allowed-transition set is small and static, and
//! a hand-written `match` is easier to audit than indirecting through
//! trait objects per state.

use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::events::step_transition_event;
use crate::error::{OrchestrationError, OrchestrationResult};
use crate::model::ExecutionState;

/// Whether `to` is a structurally legal destination from `from`.
#[must_use]
pub fn is_allowed_transition(from: ExecutionState, to: ExecutionState) -> bool {
    use ExecutionState::{Cancelled, Complete, Error, InProgress, Pending, ResolvedManually};
    match from {
        Pending => matches!(to, InProgress | Error | Cancelled | ResolvedManually),
        InProgress => matches!(to, Complete | Error | Cancelled),
        // A failed step retries by re-entering IN_PROGRESS directly rather
        // than round-tripping through PENDING first.
        Error => matches!(to, InProgress | Pending | ResolvedManually),
        Complete | Cancelled | ResolvedManually => false,
    }
}

/// The sole business guard in the step state machine: entering
/// `IN_PROGRESS` requires that every parent has already completed.
#[must_use]
pub fn in_progress_guard_satisfied(to: ExecutionState, dependencies_satisfied: bool) -> bool {
    to != ExecutionState::InProgress || dependencies_satisfied
}

/// Step-row fields refreshed alongside a terminal transition, in the same
/// transaction, so the readiness query's next read reflects this attempt
/// instead of the row's `WorkflowStep::new` defaults.
#[derive(Debug, Clone, Default)]
pub struct StepPersistUpdate {
    pub attempts: i32,
    pub last_attempted_at: Option<chrono::NaiveDateTime>,
    pub last_failure_at: Option<chrono::NaiveDateTime>,
    pub backoff_request_seconds: Option<i64>,
    pub retryable: bool,
    pub results: Option<serde_json::Value>,
}

/// The outcome of attempting a step transition.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    /// A new transition row was appended; `(from, to)`.
    Applied(Option<ExecutionState>, ExecutionState),
    /// `to` equaled the current state; no row was appended.
    Idempotent,
}

/// Validate a proposed step transition against the transition table and
/// the `IN_PROGRESS` guard, without touching storage. Returns the event
/// name to publish on success, if the transition is mapped to one.
pub fn validate(
    current: Option<ExecutionState>,
    to: ExecutionState,
    dependencies_satisfied: bool,
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

    if !in_progress_guard_satisfied(to, dependencies_satisfied) {
        return Err(OrchestrationError::guard_failed(
            from.as_str(),
            to.as_str(),
            "dependencies not satisfied",
        ));
    }

    let event = step_transition_event(current, to);
    Ok((TransitionOutcome::Applied(current, to), event))
}

/// Persist a validated transition: append a new most-recent row and unset
/// `most_recent` on the previous one, atomically. When `step_update` is
/// given, the `workflow_steps` row's own attempt bookkeeping (`attempts`,
/// `last_attempted_at`, `last_failure_at`, `backoff_request_seconds`,
/// `retryable`, `results`) is refreshed in the same transaction, so a caller
/// that reads readiness afterward sees this attempt reflected. Retries on a
/// `(step_id, most_recent)` unique-violation (a concurrent writer won the
/// race) up to `retry_limit` times before escalating to a `RetryableError`.
pub async fn append_transition(
    pool: &PgPool,
    step_id: Uuid,
    to: ExecutionState,
    metadata: serde_json::Value,
    dependencies_satisfied: bool,
    retry_limit: u32,
    step_update: Option<&StepPersistUpdate>,
) -> OrchestrationResult<TransitionOutcome> {
    for attempt in 0..=retry_limit {
        let current = fetch_current_state(pool, step_id).await?;
        let (outcome, _event) = validate(current, to, dependencies_satisfied)?;

        if matches!(outcome, TransitionOutcome::Idempotent) {
            return Ok(outcome);
        }

        let mut tx = pool.begin().await?;
        sqlx::query(
            "update workflow_step_transitions set most_recent = false \
             where step_id = $1 and most_recent = true",
        )
        .bind(step_id)
        .execute(&mut *tx)
        .await?;

        let next_sort_key: i64 = sqlx::query_scalar(
            "select coalesce(max(sort_key), 0) + 1 from workflow_step_transitions where step_id = $1",
        )
        .bind(step_id)
        .fetch_one(&mut *tx)
        .await?;

        let insert = sqlx::query(
            "insert into workflow_step_transitions \
             (step_id, from_state, to_state, metadata, sort_key, most_recent, created_at) \
             values ($1, $2, $3, $4, $5, true, now())",
        )
        .bind(step_id)
        .bind(current.map(ExecutionState::as_str))
        .bind(to.as_str())
        .bind(&metadata)
        .bind(next_sort_key)
        .execute(&mut *tx)
        .await;

        match insert {
            Ok(_) => {
                if let Some(update) = step_update {
                    sqlx::query(
                        "update workflow_steps set attempts = $2, last_attempted_at = $3, \
                         last_failure_at = $4, backoff_request_seconds = $5, retryable = $6, \
                         results = $7 where step_id = $1",
                    )
                    .bind(step_id)
                    .bind(update.attempts)
                    .bind(update.last_attempted_at)
                    .bind(update.last_failure_at)
                    .bind(update.backoff_request_seconds)
                    .bind(update.retryable)
                    .bind(&update.results)
                    .execute(&mut *tx)
                    .await?;
                }
                tx.commit().await?;
                return Ok(outcome);
            }
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                tx.rollback().await?;
                tracing::warn!(step_id = %step_id, attempt, "storage conflict on step transition, retrying");
                continue;
            }
            Err(other) => return Err(other.into()),
        }
    }

    Err(OrchestrationError::retryable(format!(
        "step {step_id} transition to {to} lost {retry_limit} consecutive storage races"
    )))
}

async fn fetch_current_state(pool: &PgPool, step_id: Uuid) -> OrchestrationResult<Option<ExecutionState>> {
    let row = sqlx::query("select to_state from workflow_step_transitions where step_id = $1 and most_recent = true")
        .bind(step_id)
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
                "unrecognized step state in storage: {other}"
            )))
        }
    })
}
