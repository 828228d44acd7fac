use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A registered task template: the (namespace, name, version) triple plus
/// the JSON schema a task's context must validate against. Immutable once
/// registered.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NamedTask {
    pub namespace: String,
    pub name: String,
    pub version: String,
    /// JSON schema (draft-agnostic; validated structurally, not interpreted
    /// here) that a `Task::context` must satisfy.
    pub context_schema: serde_json::Value,
    pub steps: Vec<StepTemplate>,
}

impl NamedTask {
    #[must_use]
    pub fn triple(&self) -> (String, String, String) {
        (self.namespace.clone(), self.name.clone(), self.version.clone())
    }

    /// Step names declared by this template, used by the graph analyzer and
    /// by duplicate/unknown-dependency validation.
    #[must_use]
    pub fn step_names(&self) -> BTreeSet<&str> {
        self.steps.iter().map(|s| s.name.as_str()).collect()
    }
}

/// A step's immutable definition within a `NamedTask`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StepTemplate {
    pub name: String,
    /// Identifies the `StepHandler` implementation invoked for this step.
    pub handler_reference: String,
    /// Names of sibling steps within the same template that must complete
    /// before this one becomes eligible.
    pub dependencies: BTreeSet<String>,
    pub retry_limit: u32,
    pub retryable: bool,
    pub dependent_system: Option<String>,
    #[serde(default)]
    pub handler_config: Option<serde_json::Value>,
}

impl StepTemplate {
    #[must_use]
    pub fn new(name: impl Into<String>, handler_reference: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handler_reference: handler_reference.into(),
            dependencies: BTreeSet::new(),
            retry_limit: 3,
            retryable: true,
            dependent_system: None,
            handler_config: None,
        }
    }

    #[must_use]
    pub fn depends_on(mut self, step_name: impl Into<String>) -> Self {
        self.dependencies.insert(step_name.into());
        self
    }

    #[must_use]
    pub fn with_retry_limit(mut self, retry_limit: u32) -> Self {
        self.retry_limit = retry_limit;
        self
    }
}
