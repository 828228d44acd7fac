//! Set-based persistence queries backing the readiness evaluator. Centralized
//! here, narrowly, the way the rest of the engine keeps SQL behind a small
//! Rust surface rather than scattering ad hoc queries through call sites.

use sqlx::PgPool;
use uuid::Uuid;

use super::ReadinessInput;
use crate::error::OrchestrationResult;
use crate::model::ExecutionState;

#[derive(sqlx::FromRow)]
struct ReadinessRow {
    step_id: Uuid,
    task_id: Uuid,
    current_state: String,
    attempts: i32,
    retry_limit: i32,
    retryable: bool,
    last_attempted_at: Option<chrono::NaiveDateTime>,
    last_failure_at: Option<chrono::NaiveDateTime>,
    backoff_request_seconds: Option<i64>,
    total_parents: i32,
    completed_parents: i32,
}

impl ReadinessRow {
    fn into_input(self) -> OrchestrationResult<ReadinessInput> {
        Ok(ReadinessInput {
            step_id: self.step_id,
            task_id: self.task_id,
            current_state: parse_state(&self.current_state)?,
            attempts: self.attempts.max(0) as u32,
            retry_limit: self.retry_limit.max(0) as u32,
            retryable: self.retryable,
            last_attempted_at: self.last_attempted_at.map(|t| t.and_utc()),
            last_failure_at: self.last_failure_at.map(|t| t.and_utc()),
            backoff_request_seconds: self.backoff_request_seconds,
            total_parents: self.total_parents.max(0) as u32,
            completed_parents: self.completed_parents.max(0) as u32,
        })
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
            return Err(crate::error::OrchestrationError::ConfigurationError(format!(
                "unrecognized step state in storage: {other}"
            )))
        }
    })
}

/// A single query joining each step against its current-state (the
/// most-recent transition row) and its parent-completion counts, for one
/// task. O(steps-in-task) rows, one round trip.
const READINESS_SQL: &str = r#"
with current_state as (
    select step_id, to_state
    from workflow_step_transitions
    where most_recent = true
),
parent_counts as (
    select
        e.task_id,
        e.to_step as step_name,
        count(*) as total_parents,
        count(*) filter (
            where coalesce(ps.to_state, 'PENDING') in ('COMPLETE', 'RESOLVED_MANUALLY')
        ) as completed_parents
    from step_edges e
    left join workflow_steps parent_ws
        on parent_ws.task_id = e.task_id and parent_ws.named_step = e.from_step
    left join current_state ps on ps.step_id = parent_ws.step_id
    group by e.task_id, e.to_step
)
select
    ws.step_id,
    ws.task_id,
    coalesce(cs.to_state, 'PENDING') as current_state,
    ws.attempts,
    ws.retry_limit,
    ws.retryable,
    ws.last_attempted_at,
    ws.last_failure_at,
    ws.backoff_request_seconds,
    coalesce(pc.total_parents, 0) as total_parents,
    coalesce(pc.completed_parents, 0) as completed_parents
from workflow_steps ws
left join current_state cs on cs.step_id = ws.step_id
left join parent_counts pc
    on pc.task_id = ws.task_id and pc.step_name = ws.named_step
where ws.task_id = any($1)
"#;

pub async fn fetch_readiness_inputs(pool: &PgPool, task_id: Uuid) -> OrchestrationResult<Vec<ReadinessInput>> {
    fetch_readiness_inputs_batch(pool, &[task_id]).await
}

pub async fn fetch_readiness_inputs_batch(
    pool: &PgPool,
    task_ids: &[Uuid],
) -> OrchestrationResult<Vec<ReadinessInput>> {
    let rows: Vec<ReadinessRow> = sqlx::query_as(READINESS_SQL)
        .bind(task_ids)
        .fetch_all(pool)
        .await?;
    rows.into_iter().map(ReadinessRow::into_input).collect()
}
