//! Persisted entities for the orchestration core: task templates, task and
//! step instances, the step dependency graph, and the append-only
//! transition log shared by both state machines.

pub mod step;
pub mod task;
pub mod template;
pub mod transition;

pub use step::{StepEdge, WorkflowStep};
pub use task::{Task, TaskRequest};
pub use template::{NamedTask, StepTemplate};
pub use transition::{StepTransition, TaskTransition};

use serde::{Deserialize, Serialize};

/// The state vocabulary shared by both the task and step state machines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionState {
    Pending,
    InProgress,
    Complete,
    Error,
    Cancelled,
    ResolvedManually,
}

impl ExecutionState {
    /// Absorbing states from which no further transition may occur. `Error`
    /// is deliberately excluded: a retry can return a step or task to
    /// `Pending`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Cancelled | Self::ResolvedManually)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Complete => "COMPLETE",
            Self::Error => "ERROR",
            Self::Cancelled => "CANCELLED",
            Self::ResolvedManually => "RESOLVED_MANUALLY",
        }
    }
}

impl std::fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
