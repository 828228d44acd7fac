//! Shared harness for the end-to-end scenario tests in `scenarios.rs`:
//! a scripted [`StepHandler`] whose outcomes are queued per step name, and
//! a `run_one_cycle` driver that evaluates readiness, executes one batch,
//! and returns the finalizer's classification of the resulting state.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use tasker_core::executor::{HandlerError, ReadyStep, Sequence, StepExecutor, StepHandler, StepOutcome};
use tasker_core::finalizer::{classify, FinalizationAction};
use tasker_core::model::{ExecutionState, NamedTask, StepTemplate, Task, TaskRequest, WorkflowStep};
use tasker_core::readiness::{aggregate, ReadinessEvaluator};
use tasker_core::registry::{initialize_task, TemplateRegistry};
use tasker_core::state_machine::task as task_machine;
use tasker_core::{config::OrchestrationConfig, event_bus::EventBus};

/// One scripted outcome a `ScriptedHandler` returns for a single
/// invocation of a given step.
#[derive(Debug, Clone)]
pub enum Scripted {
    Success(serde_json::Value),
    Retryable { message: &'static str, retry_after: Option<u64> },
    Permanent { message: &'static str, error_code: &'static str },
}

/// A `StepHandler` whose behavior per call is pre-scripted per step name,
/// queued in call order. Panics if invoked more times than scripted for a
/// given step: the scenario tests assert `attempts` separately, so a
/// script running dry signals a test bug, not a production one.
#[derive(Default)]
pub struct ScriptedHandler {
    scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
}

impl ScriptedHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, step_name: &str, outcomes: Vec<Scripted>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(step_name.to_string(), outcomes.into());
    }
}

#[async_trait]
impl StepHandler for ScriptedHandler {
    async fn process(
        &self,
        _task: &Task,
        _sequence: &Sequence,
        step: &WorkflowStep,
        _attempt_number: u32,
    ) -> Result<serde_json::Value, HandlerError> {
        let next = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&step.named_step)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| panic!("no scripted outcome left for step '{}'", step.named_step));

        match next {
            Scripted::Success(value) => Ok(value),
            Scripted::Retryable { message, retry_after } => match retry_after {
                Some(seconds) => Err(HandlerError::retryable_after(message, seconds)),
                None => Err(HandlerError::retryable(message)),
            },
            Scripted::Permanent { message, error_code } => Err(HandlerError::permanent(message, error_code)),
        }
    }
}

pub fn named_template(steps: Vec<StepTemplate>) -> NamedTask {
    NamedTask {
        namespace: "test".into(),
        name: "scenario".into(),
        version: "1.0.0".into(),
        context_schema: serde_json::json!({}),
        steps,
    }
}

pub fn task_request() -> TaskRequest {
    TaskRequest {
        name: "scenario".into(),
        namespace: "test".into(),
        version: "1.0.0".into(),
        context: serde_json::json!({}),
        initiator: "test-harness".into(),
        source_system: "tests".into(),
        reason: "scenario test".into(),
    }
}

/// Register `template` and instantiate one task from it, returning the
/// live `Task`.
pub async fn spin_up_task(pool: &PgPool, template: NamedTask) -> Task {
    let registry = TemplateRegistry::new();
    registry.register(template).await.expect("template registers");
    let instantiation = initialize_task(pool, &registry, task_request())
        .await
        .expect("task initializes");
    instantiation.task
}

async fn fetch_step_row(pool: &PgPool, step_id: Uuid) -> WorkflowStep {
    sqlx::query_as::<_, WorkflowStep>("select * from workflow_steps where step_id = $1")
        .bind(step_id)
        .fetch_one(pool)
        .await
        .expect("step row exists")
}

/// One iteration of the processing cycle: evaluate readiness, run every
/// ready step through `handler`, and return the finalizer's classification
/// of the resulting state.
pub async fn run_one_cycle(pool: &PgPool, task: &Task, handler: Arc<dyn StepHandler>) -> FinalizationAction {
    let backoff_config = OrchestrationConfig::default().backoff;
    let evaluator = ReadinessEvaluator::new(Arc::new(pool.clone()), backoff_config.clone());
    let records = evaluator.readiness(task.task_id).await.expect("readiness query succeeds");

    let mut ready_steps = Vec::new();
    for record in records.iter().filter(|r| r.ready_for_execution) {
        ready_steps.push(ReadyStep {
            step: fetch_step_row(pool, record.step_id).await,
            dependencies_satisfied: record.dependencies_satisfied,
            handler: handler.clone(),
        });
    }

    if !ready_steps.is_empty() {
        let executor = StepExecutor::new(
            pool.clone(),
            Arc::new(EventBus::new()),
            OrchestrationConfig::default().execution,
            backoff_config.storage_conflict_retry_limit,
        );
        let cancellation = Arc::new(AtomicBool::new(false));
        let outcomes = executor.execute_batch(task, ready_steps, cancellation).await;
        for (_step_id, outcome) in outcomes {
            if let StepOutcome::Failed(err) = outcome {
                tracing::debug!(%err, "scripted step failed (expected by some scenarios)");
            }
        }
    }

    let records_after = evaluator.readiness(task.task_id).await.expect("readiness query succeeds");
    let context = aggregate(task.task_id, &records_after);
    classify(&context, &OrchestrationConfig::default().reenqueue_delays, chrono::Utc::now())
}

/// Apply a `FinalizationAction` to the task's own state machine:
/// transition to `COMPLETE`/`ERROR`, or do nothing for a re-enqueue (the
/// test driver sleeps the delay itself between calling `run_one_cycle`).
pub async fn apply_finalization(pool: &PgPool, task_id: Uuid, action: &FinalizationAction, steps_outstanding: u32) {
    match action {
        FinalizationAction::Complete => {
            task_machine::append_transition(pool, task_id, ExecutionState::Complete, serde_json::json!({}), steps_outstanding, 3)
                .await
                .expect("task completes");
        }
        FinalizationAction::Error => {
            task_machine::append_transition(pool, task_id, ExecutionState::Error, serde_json::json!({}), steps_outstanding, 3)
                .await
                .expect("task errors");
        }
        FinalizationAction::Reenqueue { .. } => {}
    }
}

pub async fn fetch_step_state(pool: &PgPool, step_id: Uuid) -> Option<ExecutionState> {
    let raw: Option<String> = sqlx::query_scalar(
        "select to_state from workflow_step_transitions where step_id = $1 and most_recent = true",
    )
    .bind(step_id)
    .fetch_optional(pool)
    .await
    .expect("query succeeds");

    raw.map(|s| match s.as_str() {
        "PENDING" => ExecutionState::Pending,
        "IN_PROGRESS" => ExecutionState::InProgress,
        "COMPLETE" => ExecutionState::Complete,
        "ERROR" => ExecutionState::Error,
        "CANCELLED" => ExecutionState::Cancelled,
        "RESOLVED_MANUALLY" => ExecutionState::ResolvedManually,
        other => panic!("unrecognized state {other}"),
    })
}

pub async fn transition_count(pool: &PgPool, step_id: Uuid) -> i64 {
    sqlx::query_scalar::<_, i64>("select count(*) from workflow_step_transitions where step_id = $1")
        .bind(step_id)
        .fetch_one(pool)
        .await
        .expect("count succeeds")
}

pub async fn attempts(pool: &PgPool, step_id: Uuid) -> i32 {
    sqlx::query_scalar::<_, i32>("select attempts from workflow_steps where step_id = $1")
        .bind(step_id)
        .fetch_one(pool)
        .await
        .expect("step row exists")
}
