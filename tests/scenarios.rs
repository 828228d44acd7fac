//! End-to-end scenarios exercising the readiness evaluator, the bounded
//! step executor, the two state machines, and the finalizer together
//! against a real database.

mod common;

use std::sync::Arc;

use sqlx::PgPool;
use uuid::Uuid;

use common::{
    apply_finalization, attempts, fetch_step_state, named_template, run_one_cycle, spin_up_task,
    transition_count, Scripted, ScriptedHandler,
};
use tasker_core::executor::StepHandler;
use tasker_core::finalizer::FinalizationAction;
use tasker_core::model::{ExecutionState, StepTemplate};
use tasker_core::readiness::{BlockingReason, ReadinessEvaluator};
use tasker_core::registry::TemplateRegistry;
use tasker_core::state_machine::step as step_machine;

/// a -> {b, c} -> d. Every step succeeds once; the task should run to
/// `COMPLETE` with every step visited exactly once.
#[sqlx::test(migrator = "tasker_core::database::MIGRATOR")]
async fn diamond_dependency_graph_completes(pool: PgPool) {
    let template = named_template(vec![
        StepTemplate::new("a", "A"),
        StepTemplate::new("b", "B").depends_on("a"),
        StepTemplate::new("c", "C").depends_on("a"),
        StepTemplate::new("d", "D").depends_on("b").depends_on("c"),
    ]);

    let handler = Arc::new(ScriptedHandler::new());
    for name in ["a", "b", "c", "d"] {
        handler.script(name, vec![Scripted::Success(serde_json::json!({ "step": name }))]);
    }

    let task = spin_up_task(&pool, template).await;
    let handler: Arc<dyn StepHandler> = handler;

    let mut action = run_one_cycle(&pool, &task, handler.clone()).await;
    let mut cycles = 0;
    while !matches!(action, FinalizationAction::Complete | FinalizationAction::Error) {
        cycles += 1;
        assert!(cycles <= 10, "diamond graph did not converge within 10 cycles");
        action = run_one_cycle(&pool, &task, handler.clone()).await;
    }

    assert_eq!(action, FinalizationAction::Complete);
    apply_finalization(&pool, task.task_id, &action, 0).await;
}

/// A single step fails once with a zero-delay retryable error, then
/// succeeds on its second attempt. `attempts` should read 2 and the step
/// should end `COMPLETE`.
#[sqlx::test(migrator = "tasker_core::database::MIGRATOR")]
async fn retryable_failure_then_success_completes_the_step(pool: PgPool) {
    let template = named_template(vec![StepTemplate::new("charge", "Charge").with_retry_limit(3)]);

    let handler = Arc::new(ScriptedHandler::new());
    handler.script(
        "charge",
        vec![
            Scripted::Retryable { message: "gateway timeout", retry_after: Some(0) },
            Scripted::Success(serde_json::json!({ "charged": true })),
        ],
    );

    let task = spin_up_task(&pool, template).await;
    let handler: Arc<dyn StepHandler> = handler;
    let step_id = fetch_only_step_id(&pool, task.task_id).await;

    // First cycle: the step fails and is re-enqueued.
    let first = run_one_cycle(&pool, &task, handler.clone()).await;
    assert!(matches!(first, FinalizationAction::Reenqueue { .. }));
    assert_eq!(fetch_step_state(&pool, step_id).await, Some(ExecutionState::Error));

    // Second cycle: zero-delay retry is immediately eligible and succeeds.
    let second = run_one_cycle(&pool, &task, handler.clone()).await;
    assert_eq!(second, FinalizationAction::Complete);
    assert_eq!(fetch_step_state(&pool, step_id).await, Some(ExecutionState::Complete));
    assert_eq!(attempts(&pool, step_id).await, 2);
}

/// A permanent failure disables further retries regardless of the
/// configured retry limit; the task finalizes as `ERROR` after one cycle.
#[sqlx::test(migrator = "tasker_core::database::MIGRATOR")]
async fn permanent_failure_errors_the_task_without_retrying(pool: PgPool) {
    let template = named_template(vec![StepTemplate::new("charge", "Charge").with_retry_limit(5)]);

    let handler = Arc::new(ScriptedHandler::new());
    handler.script("charge", vec![Scripted::Permanent { message: "card declined", error_code: "CARD_DECLINED" }]);

    let task = spin_up_task(&pool, template).await;
    let handler: Arc<dyn StepHandler> = handler;
    let step_id = fetch_only_step_id(&pool, task.task_id).await;

    let action = run_one_cycle(&pool, &task, handler).await;
    assert_eq!(action, FinalizationAction::Error);
    assert_eq!(fetch_step_state(&pool, step_id).await, Some(ExecutionState::Error));
    assert_eq!(attempts(&pool, step_id).await, 1);

    // Re-running readiness confirms the step is not retry-eligible: one
    // permanent failure is enough to exhaust it regardless of attempts left.
    let evaluator = ReadinessEvaluator::new(Arc::new(pool.clone()), Default::default());
    let records = evaluator.readiness(task.task_id).await.unwrap();
    let record = records.iter().find(|r| r.step_id == step_id).unwrap();
    assert!(!record.retry_eligible);
    assert!(!record.ready_for_execution);
}

/// `b` depends on `a`; before `a` ever runs, `b` is blocked on unsatisfied
/// dependencies, not on an invalid state or a retry window.
#[sqlx::test(migrator = "tasker_core::database::MIGRATOR")]
async fn dependent_step_is_blocked_until_its_parent_completes(pool: PgPool) {
    let template = named_template(vec![
        StepTemplate::new("a", "A"),
        StepTemplate::new("b", "B").depends_on("a"),
    ]);

    let task = spin_up_task(&pool, template).await;

    let evaluator = ReadinessEvaluator::new(Arc::new(pool.clone()), Default::default());
    let records = evaluator.readiness(task.task_id).await.unwrap();

    let a = records.iter().find(|r| r.total_parents == 0).unwrap();
    assert!(a.ready_for_execution);

    let b = records.iter().find(|r| r.total_parents == 1).unwrap();
    assert!(!b.dependencies_satisfied);
    assert!(!b.ready_for_execution);
    assert_eq!(b.blocking_reason, Some(BlockingReason::DependenciesNotSatisfied));
}

/// A template whose steps depend on each other cyclically is rejected at
/// registration time; nothing is written for that (namespace, name,
/// version) triple.
#[tokio::test]
async fn cyclic_template_is_rejected_at_registration() {
    let registry = TemplateRegistry::new();
    let template = named_template(vec![
        StepTemplate::new("a", "A").depends_on("b"),
        StepTemplate::new("b", "B").depends_on("a"),
    ]);

    let err = registry.register(template).await.unwrap_err();
    assert!(matches!(err, tasker_core::OrchestrationError::CycleDetected(_)));
    assert!(registry.get("test", "scenario", "1.0.0").await.is_err());
}

/// Re-appending a transition to the state a step is already in is a no-op:
/// no new transition row is written and the step's state is unchanged.
#[sqlx::test(migrator = "tasker_core::database::MIGRATOR")]
async fn reapplying_the_same_step_transition_is_idempotent(pool: PgPool) {
    let template = named_template(vec![StepTemplate::new("a", "A")]);
    let task = spin_up_task(&pool, template).await;
    let step_id = fetch_only_step_id(&pool, task.task_id).await;

    step_machine::append_transition(&pool, step_id, ExecutionState::InProgress, serde_json::json!({}), true, 3, None)
        .await
        .unwrap();
    assert_eq!(transition_count(&pool, step_id).await, 1);

    // Same destination state again: idempotent, no new row.
    let outcome = step_machine::append_transition(&pool, step_id, ExecutionState::InProgress, serde_json::json!({}), true, 3, None)
        .await
        .unwrap();
    assert!(matches!(outcome, step_machine::TransitionOutcome::Idempotent));
    assert_eq!(transition_count(&pool, step_id).await, 1);
    assert_eq!(fetch_step_state(&pool, step_id).await, Some(ExecutionState::InProgress));
}

async fn fetch_only_step_id(pool: &PgPool, task_id: Uuid) -> Uuid {
    sqlx::query_scalar::<_, Uuid>("select step_id from workflow_steps where task_id = $1")
        .bind(task_id)
        .fetch_one(pool)
        .await
        .expect("exactly one step for this task")
}
