//! # Finalizer / Re-enqueuer
//!
//! After a step batch runs, decides what happens to the task next: finish,
//! fail, or schedule another processing cycle at a computed delay. Pure
//! classification logic, so it is tested without a database; the caller is
//! responsible for actually performing the task transition or the
//! re-enqueue.

use chrono::{DateTime, Utc};

use crate::config::ReenqueueDelaysConfig;
use crate::readiness::{ExecutionStatus, TaskExecutionContext};

/// What the finalizer decided to do with a task after a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum FinalizationAction {
    /// Transition the task to `COMPLETE`.
    Complete,
    /// Transition the task to `ERROR`: every outstanding failure is
    /// retry-exhausted or permanent.
    Error,
    /// Schedule another processing cycle no sooner than `delay`.
    Reenqueue { delay: chrono::Duration },
}

/// Classify a task's execution context into the action the finalizer
/// takes, per the engine's classification table. The returned re-enqueue
/// delay is never shorter than the earliest step's `next_retry_at`, so
/// polling never wakes before any step can legally run.
#[must_use]
pub fn classify(context: &TaskExecutionContext, config: &ReenqueueDelaysConfig, now: DateTime<Utc>) -> FinalizationAction {
    match context.execution_status {
        ExecutionStatus::AllComplete => FinalizationAction::Complete,
        ExecutionStatus::BlockedByFailures => FinalizationAction::Error,
        ExecutionStatus::HasReadySteps => FinalizationAction::Reenqueue {
            delay: chrono::Duration::seconds(config.has_ready_steps_seconds as i64),
        },
        ExecutionStatus::Processing => FinalizationAction::Reenqueue {
            delay: chrono::Duration::seconds(config.processing_seconds as i64),
        },
        ExecutionStatus::WaitingForDependencies => {
            let configured = chrono::Duration::seconds(config.waiting_for_dependencies_seconds as i64);
            let delay = match context.earliest_next_retry_at {
                Some(deadline) if deadline > now => {
                    let until_deadline = deadline - now + chrono::Duration::seconds(config.buffer_seconds as i64);
                    if until_deadline < configured {
                        until_deadline
                    } else {
                        configured
                    }
                }
                _ => configured,
            };
            FinalizationAction::Reenqueue { delay }
        }
    }
}

/// The `otherwise` row of the classification table: used only if a caller
/// somehow has no `ExecutionStatus` to classify (there is currently no such
/// path, since `aggregate` always produces one of the five statuses, but
/// the fallback delay is exposed for completeness with the documented
/// default).
#[must_use]
pub fn default_delay(config: &ReenqueueDelaysConfig) -> chrono::Duration {
    chrono::Duration::seconds(config.default_seconds as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn context(status: ExecutionStatus) -> TaskExecutionContext {
        TaskExecutionContext {
            task_id: Uuid::now_v7(),
            total_steps: 3,
            pending: 0,
            in_progress: 0,
            completed: 0,
            failed: 0,
            ready: 0,
            completion_percentage: 0.0,
            execution_status: status,
            recommended_action: crate::readiness::RecommendedAction::WaitForDependencies,
            earliest_next_retry_at: None,
        }
    }

    #[test]
    fn all_complete_finalizes_task_as_complete() {
        let action = classify(&context(ExecutionStatus::AllComplete), &ReenqueueDelaysConfig::default(), Utc::now());
        assert_eq!(action, FinalizationAction::Complete);
    }

    #[test]
    fn blocked_by_failures_finalizes_task_as_error() {
        let action = classify(&context(ExecutionStatus::BlockedByFailures), &ReenqueueDelaysConfig::default(), Utc::now());
        assert_eq!(action, FinalizationAction::Error);
    }

    #[test]
    fn has_ready_steps_reenqueues_with_zero_delay_by_default() {
        let action = classify(&context(ExecutionStatus::HasReadySteps), &ReenqueueDelaysConfig::default(), Utc::now());
        assert_eq!(action, FinalizationAction::Reenqueue { delay: chrono::Duration::seconds(0) });
    }

    #[test]
    fn processing_reenqueues_with_configured_delay() {
        let action = classify(&context(ExecutionStatus::Processing), &ReenqueueDelaysConfig::default(), Utc::now());
        assert_eq!(action, FinalizationAction::Reenqueue { delay: chrono::Duration::seconds(10) });
    }

    #[test]
    fn waiting_for_dependencies_uses_configured_delay_when_no_earlier_deadline() {
        let action = classify(&context(ExecutionStatus::WaitingForDependencies), &ReenqueueDelaysConfig::default(), Utc::now());
        assert_eq!(action, FinalizationAction::Reenqueue { delay: chrono::Duration::seconds(45) });
    }

    #[test]
    fn waiting_for_dependencies_prefers_earlier_step_deadline_plus_buffer() {
        let now = Utc::now();
        let mut ctx = context(ExecutionStatus::WaitingForDependencies);
        ctx.earliest_next_retry_at = Some(now + chrono::Duration::seconds(10));
        let config = ReenqueueDelaysConfig::default();
        let action = classify(&ctx, &config, now);
        assert_eq!(action, FinalizationAction::Reenqueue { delay: chrono::Duration::seconds(15) });
    }

    #[test]
    fn waiting_for_dependencies_never_wakes_before_a_later_deadline_than_the_default() {
        let now = Utc::now();
        let mut ctx = context(ExecutionStatus::WaitingForDependencies);
        ctx.earliest_next_retry_at = Some(now + chrono::Duration::seconds(200));
        let config = ReenqueueDelaysConfig::default();
        let action = classify(&ctx, &config, now);
        // The far-off step deadline does not shorten the wait below the
        // configured ceiling; it only shortens it when sooner.
        assert_eq!(action, FinalizationAction::Reenqueue { delay: chrono::Duration::seconds(45) });
    }

    #[test]
    fn default_delay_matches_documented_value() {
        assert_eq!(default_delay(&ReenqueueDelaysConfig::default()), chrono::Duration::seconds(30));
    }
}
