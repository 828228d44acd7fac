//! Turns a registered [`NamedTask`] template plus a [`TaskRequest`] into a
//! live task: a persisted `Task` row, one `WorkflowStep` per step template,
//! and the `StepEdge` rows mirroring the template's dependency graph.
//!
//! The step graph is rechecked for cycles at initialization time even
//! though registration already rejected cyclic templates, and a task's
//! context is validated against its named task's schema before any step
//! row is created.

use sqlx::PgPool;

use super::graph::analyze;
use crate::error::{OrchestrationError, OrchestrationResult};
use crate::model::{NamedTask, StepEdge, Task, TaskRequest, WorkflowStep};

use super::TemplateRegistry;

/// A task instantiated from a template, not yet persisted.
#[derive(Debug, Clone)]
pub struct TaskInstantiation {
    pub task: Task,
    pub steps: Vec<WorkflowStep>,
    pub edges: Vec<StepEdge>,
}

/// Validate `context` against `schema` using standard JSON Schema
/// semantics. A schema of `{}` (or absent `type`) accepts anything, so
/// templates that don't constrain their context still validate.
pub fn validate_context(schema: &serde_json::Value, context: &serde_json::Value) -> OrchestrationResult<()> {
    let validator = jsonschema::validator_for(schema)
        .map_err(|e| OrchestrationError::ConfigurationError(format!("invalid context schema: {e}")))?;
    let errors: Vec<String> = validator.iter_errors(context).map(|e| e.to_string()).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(OrchestrationError::InvalidContext(errors.join("; ")))
    }
}

/// Build (without persisting) the task, step, and edge rows for `request`
/// against `template`. Rechecks acyclicity even though registration
/// already rejected cyclic templates.
pub fn instantiate(template: &NamedTask, request: TaskRequest) -> OrchestrationResult<TaskInstantiation> {
    validate_context(&template.context_schema, &request.context)?;

    let report = analyze(template);
    if report.has_cycle() {
        return Err(OrchestrationError::CycleDetected(report.cycles));
    }

    let task = Task::new(
        request.namespace,
        request.name,
        request.version,
        request.context,
        request.initiator,
        request.source_system,
        request.reason,
    );

    let steps: Vec<WorkflowStep> = template
        .steps
        .iter()
        .map(|step_template| {
            WorkflowStep::new(
                task.task_id,
                step_template.name.clone(),
                step_template.retry_limit as i32,
                step_template.retryable,
            )
        })
        .collect();

    let edges: Vec<StepEdge> = template
        .steps
        .iter()
        .flat_map(|step_template| {
            step_template.dependencies.iter().map(|dep| StepEdge {
                task_id: task.task_id,
                from_step: dep.clone(),
                to_step: step_template.name.clone(),
                edge_type: "provides".to_string(),
            })
        })
        .collect();

    Ok(TaskInstantiation { task, steps, edges })
}

/// Look up `request`'s template in `registry`, instantiate it, and persist
/// the template's own rows (upserted, idempotently), the task, its steps,
/// and its edges, all in one transaction. No transition rows are written:
/// absence of a transition row means `PENDING`.
pub async fn initialize_task(
    pool: &PgPool,
    registry: &TemplateRegistry,
    request: TaskRequest,
) -> OrchestrationResult<TaskInstantiation> {
    let template = registry
        .get(&request.namespace, &request.name, &request.version)
        .await?;
    let instantiation = instantiate(&template, request)?;
    persist(pool, &template, &instantiation).await?;
    Ok(instantiation)
}

/// Upserts the template's own rows (`task_namespaces`, `named_tasks`,
/// `named_steps`, `dependent_systems`) so the task row inserted afterward
/// satisfies its foreign key into `named_tasks`. Registration only keeps
/// templates in the in-process [`TemplateRegistry`]; the first task created
/// from a given (namespace, name, version) triple is what persists it.
/// `on conflict do nothing` makes this safe to repeat for every task
/// instantiated from the same template.
async fn persist_template(tx: &mut sqlx::Transaction<'_, sqlx::Postgres>, template: &NamedTask) -> OrchestrationResult<()> {
    sqlx::query("insert into task_namespaces (name) values ($1) on conflict do nothing")
        .bind(&template.namespace)
        .execute(&mut **tx)
        .await?;

    sqlx::query(
        "insert into named_tasks (namespace, name, version, context_schema) values ($1, $2, $3, $4) \
         on conflict (namespace, name, version) do nothing",
    )
    .bind(&template.namespace)
    .bind(&template.name)
    .bind(&template.version)
    .bind(&template.context_schema)
    .execute(&mut **tx)
    .await?;

    for step_template in &template.steps {
        if let Some(dependent_system) = &step_template.dependent_system {
            sqlx::query("insert into dependent_systems (name) values ($1) on conflict do nothing")
                .bind(dependent_system)
                .execute(&mut **tx)
                .await?;
        }

        sqlx::query(
            "insert into named_steps \
             (namespace, named_task, version, name, handler_reference, retry_limit, retryable, dependent_system, handler_config) \
             values ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             on conflict (namespace, named_task, version, name) do nothing",
        )
        .bind(&template.namespace)
        .bind(&template.name)
        .bind(&template.version)
        .bind(&step_template.name)
        .bind(&step_template.handler_reference)
        .bind(step_template.retry_limit as i32)
        .bind(step_template.retryable)
        .bind(&step_template.dependent_system)
        .bind(&step_template.handler_config)
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

async fn persist(pool: &PgPool, template: &NamedTask, instantiation: &TaskInstantiation) -> OrchestrationResult<()> {
    let mut tx = pool.begin().await?;

    persist_template(&mut tx, template).await?;

    sqlx::query(
        "insert into tasks (task_id, namespace, named_task, version, context, initiator, source_system, reason, created_at) \
         values ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(instantiation.task.task_id)
    .bind(&instantiation.task.namespace)
    .bind(&instantiation.task.named_task)
    .bind(&instantiation.task.version)
    .bind(&instantiation.task.context)
    .bind(&instantiation.task.initiator)
    .bind(&instantiation.task.source_system)
    .bind(&instantiation.task.reason)
    .bind(instantiation.task.created_at)
    .execute(&mut *tx)
    .await?;

    for step in &instantiation.steps {
        sqlx::query(
            "insert into workflow_steps (step_id, task_id, named_step, attempts, retry_limit, retryable) \
             values ($1, $2, $3, 0, $4, $5)",
        )
        .bind(step.step_id)
        .bind(step.task_id)
        .bind(&step.named_step)
        .bind(step.retry_limit)
        .bind(step.retryable)
        .execute(&mut *tx)
        .await?;
    }

    for edge in &instantiation.edges {
        sqlx::query(
            "insert into step_edges (task_id, from_step, to_step, edge_type) values ($1, $2, $3, $4)",
        )
        .bind(edge.task_id)
        .bind(&edge.from_step)
        .bind(&edge.to_step)
        .bind(&edge.edge_type)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}
