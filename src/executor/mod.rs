//! # Step Executor
//!
//! Runs a batch of ready steps concurrently under a bounded worker pool,
//! maps each outcome to a state transition, and honors non-preemptive
//! per-task cancellation.

pub mod handler;
pub mod worker_state;

pub use handler::{HandlerError, Sequence, StepHandler};
pub use worker_state::WorkerState;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use sqlx::PgPool;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::config::ExecutionConfig;
use crate::error::OrchestrationError;
use crate::event_bus::EventBus;
use crate::model::{ExecutionState, Task, WorkflowStep};
use crate::state_machine::step::StepPersistUpdate;
use crate::state_machine::{step as step_machine, StepEventPayloadBuilder};

/// One step ready to run, paired with the handler that owns it and whether
/// its dependencies are currently satisfied (rechecked here rather than
/// trusted blindly from an earlier readiness read).
pub struct ReadyStep {
    pub step: WorkflowStep,
    pub dependencies_satisfied: bool,
    pub handler: Arc<dyn StepHandler>,
}

/// The result of running one step's handler through to its terminal
/// transition for this attempt.
#[derive(Debug)]
pub enum StepOutcome {
    Completed(serde_json::Value),
    Failed(OrchestrationError),
    Cancelled,
}

pub struct StepExecutor {
    db_pool: PgPool,
    event_bus: Arc<EventBus>,
    execution_config: ExecutionConfig,
    storage_conflict_retry_limit: u32,
}

impl StepExecutor {
    #[must_use]
    pub fn new(
        db_pool: PgPool,
        event_bus: Arc<EventBus>,
        execution_config: ExecutionConfig,
        storage_conflict_retry_limit: u32,
    ) -> Self {
        Self {
            db_pool,
            event_bus,
            execution_config,
            storage_conflict_retry_limit,
        }
    }

    /// Run every ready step concurrently under a worker pool sized from
    /// `execution_config`, honoring `cancellation` per the engine's
    /// non-preemptive cancellation contract: workers that have not started
    /// are dropped, in-flight workers are awaited to completion, and a
    /// worker whose task became terminal while it ran does not record a
    /// success transition.
    pub async fn execute_batch(
        &self,
        task: &Task,
        ready_steps: Vec<ReadyStep>,
        cancellation: Arc<AtomicBool>,
    ) -> Vec<(Uuid, StepOutcome)> {
        if ready_steps.is_empty() {
            return Vec::new();
        }

        let pool_size = self.execution_config.clamp_pool_size(ready_steps.len());
        let batch_timeout = self.execution_config.batch_timeout(ready_steps.len());
        let semaphore = Arc::new(Semaphore::new(pool_size));
        let states: Arc<StdMutex<HashMap<Uuid, WorkerState>>> = Arc::new(StdMutex::new(HashMap::new()));

        let mut join_set: JoinSet<(Uuid, StepOutcome)> = JoinSet::new();

        for ready in ready_steps {
            let step_id = ready.step.step_id;

            if cancellation.load(Ordering::SeqCst) {
                states.lock().unwrap().insert(step_id, WorkerState::Cancelled);
                continue;
            }
            states.lock().unwrap().insert(step_id, WorkerState::Scheduled);

            let semaphore = semaphore.clone();
            let db_pool = self.db_pool.clone();
            let event_bus = self.event_bus.clone();
            let states = states.clone();
            let cancellation = cancellation.clone();
            let task = task.clone();
            let storage_conflict_retry_limit = self.storage_conflict_retry_limit;

            join_set.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    states.lock().unwrap().insert(step_id, WorkerState::Cancelled);
                    return (step_id, StepOutcome::Cancelled);
                };

                if cancellation.load(Ordering::SeqCst) {
                    states.lock().unwrap().insert(step_id, WorkerState::Cancelled);
                    return (step_id, StepOutcome::Cancelled);
                }
                states.lock().unwrap().insert(step_id, WorkerState::Running);

                let outcome = run_one_step(
                    &db_pool,
                    &event_bus,
                    &task,
                    ready,
                    &cancellation,
                    storage_conflict_retry_limit,
                )
                .await;

                states.lock().unwrap().insert(step_id, WorkerState::Done);
                (step_id, outcome)
            });
        }

        let mut results = Vec::new();
        let drain = async {
            while let Some(joined) = join_set.join_next().await {
                if let Ok(result) = joined {
                    results.push(result);
                }
            }
        };

        if tokio::time::timeout(batch_timeout, drain).await.is_err() {
            tracing::warn!(
                task_id = %task.task_id,
                batch_size = results.len(),
                "step batch timed out; remaining in-flight steps will record their own outcome on completion"
            );
        }

        results
    }
}

async fn run_one_step(
    db_pool: &PgPool,
    event_bus: &EventBus,
    task: &Task,
    ready: ReadyStep,
    cancellation: &AtomicBool,
    storage_conflict_retry_limit: u32,
) -> StepOutcome {
    let mut step = ready.step;
    let step_name = step.named_step.clone();

    let transition_metadata = serde_json::json!({ "attempt": step.attempts + 1 });
    if let Err(err) = step_machine::append_transition(
        db_pool,
        step.step_id,
        ExecutionState::InProgress,
        transition_metadata,
        ready.dependencies_satisfied,
        storage_conflict_retry_limit,
        None,
    )
    .await
    {
        return StepOutcome::Failed(err);
    }
    publish_step_event(event_bus, task.task_id, step.step_id, &step_name, Some(ExecutionState::Pending), ExecutionState::InProgress, step.attempts, None);

    step.record_attempt();
    let attempt_number = step.attempts;

    let siblings = match fetch_task_steps(db_pool, task.task_id).await {
        Ok(steps) => steps,
        Err(err) => return StepOutcome::Failed(err),
    };
    let sequence = Sequence::new(siblings);
    let handler_result = ready
        .handler
        .process(task, &sequence, &step, attempt_number)
        .await;

    // A cancelled task refuses to record a success transition for work that
    // finished after cancellation was requested; the handler still ran to
    // completion (non-preemptive), but its result is discarded.
    if cancellation.load(Ordering::SeqCst) {
        return StepOutcome::Cancelled;
    }

    match handler_result {
        Ok(raw) => {
            let results = ready.handler.process_results(step.step_id, raw.clone());
            step.results = Some(results);
            let step_update = StepPersistUpdate {
                attempts: step.attempts,
                last_attempted_at: step.last_attempted_at,
                last_failure_at: step.last_failure_at,
                backoff_request_seconds: step.backoff_request_seconds,
                retryable: step.retryable,
                results: step.results.clone(),
            };
            if let Err(err) = step_machine::append_transition(
                db_pool,
                step.step_id,
                ExecutionState::Complete,
                serde_json::json!({ "attempt": attempt_number }),
                true,
                storage_conflict_retry_limit,
                Some(&step_update),
            )
            .await
            {
                return StepOutcome::Failed(err);
            }
            publish_step_event(
                event_bus,
                task.task_id,
                step.step_id,
                &step_name,
                Some(ExecutionState::InProgress),
                ExecutionState::Complete,
                attempt_number,
                None,
            );
            StepOutcome::Completed(raw)
        }
        Err(handler_error) => {
            let permanent = matches!(handler_error, HandlerError::Permanent { .. });
            let retry_after = match &handler_error {
                HandlerError::Retryable { retry_after, .. } => *retry_after,
                HandlerError::Permanent { .. } => None,
            };
            step.record_failure(retry_after.map(|s| s as i64));
            if permanent {
                step.mark_permanently_failed();
            }

            let error: OrchestrationError = handler_error.into();
            let (message, code) = match &error {
                OrchestrationError::RetryableError { message, .. } => (message.clone(), "RETRYABLE".to_string()),
                OrchestrationError::PermanentError { message, error_code } => (message.clone(), error_code.clone()),
                other => (other.to_string(), "UNKNOWN".to_string()),
            };

            let step_update = StepPersistUpdate {
                attempts: step.attempts,
                last_attempted_at: step.last_attempted_at,
                last_failure_at: step.last_failure_at,
                backoff_request_seconds: step.backoff_request_seconds,
                retryable: step.retryable,
                results: step.results.clone(),
            };
            if let Err(err) = step_machine::append_transition(
                db_pool,
                step.step_id,
                ExecutionState::Error,
                serde_json::json!({ "attempt": attempt_number, "error_code": code }),
                true,
                storage_conflict_retry_limit,
                Some(&step_update),
            )
            .await
            {
                return StepOutcome::Failed(err);
            }
            publish_step_event(
                event_bus,
                task.task_id,
                step.step_id,
                &step_name,
                Some(ExecutionState::InProgress),
                ExecutionState::Error,
                attempt_number,
                Some((message, code)),
            );
            StepOutcome::Failed(error)
        }
    }
}

/// Load every step belonging to `task_id`, `results` included, so a handler
/// can be handed a `Sequence` over its siblings' actual persisted output
/// rather than an empty one.
async fn fetch_task_steps(db_pool: &PgPool, task_id: Uuid) -> Result<Vec<WorkflowStep>, OrchestrationError> {
    sqlx::query_as::<_, WorkflowStep>("select * from workflow_steps where task_id = $1")
        .bind(task_id)
        .fetch_all(db_pool)
        .await
        .map_err(OrchestrationError::from)
}

#[allow(clippy::too_many_arguments)]
fn publish_step_event(
    event_bus: &EventBus,
    task_id: Uuid,
    step_id: Uuid,
    step_name: &str,
    from_state: Option<ExecutionState>,
    to_state: ExecutionState,
    attempt_number: u32,
    error: Option<(String, String)>,
) {
    let Some(event_name) = crate::state_machine::step_transition_event(from_state, to_state) else {
        tracing::warn!(?from_state, ?to_state, "step transition has no mapped event");
        return;
    };
    let mut builder = StepEventPayloadBuilder::new(task_id, step_id, step_name, from_state, to_state, attempt_number);
    if let Some((message, exception_class)) = error {
        builder = builder.error(message, exception_class);
    }
    let payload = builder.build();
    if let Err(err) = event_bus.publish(event_name, &serde_json::to_value(&payload).unwrap_or_default()) {
        tracing::error!(event_name, %err, "failed to publish step event");
    }
}
