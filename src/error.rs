//! # Orchestration Error Types
//!
//! Unified error handling for the orchestration core.

use thiserror::Error;

/// Orchestration operation result type
pub type OrchestrationResult<T> = Result<T, OrchestrationError>;

/// Comprehensive error types for orchestration operations.
///
/// Each variant corresponds to one of the error kinds named in the
/// engine's error-handling design: transient failures that the engine
/// itself recovers from, permanent failures surfaced to callers, guard
/// and configuration failures raised at registration or transition time,
/// and the authorization boundary.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error("retryable error: {message}")]
    RetryableError {
        message: String,
        retry_after: Option<u64>,
    },

    #[error("permanent error [{error_code}]: {message}")]
    PermanentError { message: String, error_code: String },

    #[error("guard failed: transition {from} -> {to} rejected: {reason}")]
    GuardFailed {
        from: String,
        to: String,
        reason: String,
    },

    #[error("configuration error: {0}")]
    ConfigurationError(String),

    #[error("duplicate template: ({namespace}, {name}, {version}) already registered with a different definition")]
    DuplicateTemplate {
        namespace: String,
        name: String,
        version: String,
    },

    #[error("cycle detected in template graph: {0:?}")]
    CycleDetected(Vec<Vec<String>>),

    #[error("unknown dependency: step {step} depends on undefined step {missing}")]
    UnknownDependency { step: String, missing: String },

    #[error("storage conflict on {entity} {id}: concurrent writer won the race")]
    StorageConflict { entity: &'static str, id: String },

    #[error("unauthorized: {action} on {resource} denied")]
    Unauthorized { resource: String, action: String },

    #[error("unknown resource/action pair: {resource}/{action} is not in the resource registry")]
    UnknownResourceAction { resource: String, action: String },

    #[error("database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("template not found: {namespace}/{name}/{version}")]
    TemplateNotFound {
        namespace: String,
        name: String,
        version: String,
    },

    #[error("task not found: {task_id}")]
    TaskNotFound { task_id: uuid::Uuid },

    #[error("step not found: {step_id}")]
    StepNotFound { step_id: uuid::Uuid },

    #[error("context failed schema validation: {0}")]
    InvalidContext(String),
}

impl OrchestrationError {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self::RetryableError {
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn retryable_after(message: impl Into<String>, retry_after: u64) -> Self {
        Self::RetryableError {
            message: message.into(),
            retry_after: Some(retry_after),
        }
    }

    pub fn permanent(message: impl Into<String>, error_code: impl Into<String>) -> Self {
        Self::PermanentError {
            message: message.into(),
            error_code: error_code.into(),
        }
    }

    pub fn guard_failed(
        from: impl Into<String>,
        to: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::GuardFailed {
            from: from.into(),
            to: to.into(),
            reason: reason.into(),
        }
    }

    pub fn storage_conflict(entity: &'static str, id: impl Into<String>) -> Self {
        Self::StorageConflict {
            entity,
            id: id.into(),
        }
    }

    pub fn unauthorized(resource: impl Into<String>, action: impl Into<String>) -> Self {
        Self::Unauthorized {
            resource: resource.into(),
            action: action.into(),
        }
    }

    pub fn unknown_resource_action(resource: impl Into<String>, action: impl Into<String>) -> Self {
        Self::UnknownResourceAction {
            resource: resource.into(),
            action: action.into(),
        }
    }

    /// Whether the engine should recover from this locally (retry, backoff,
    /// or re-read-and-retry) rather than surface it to a caller.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::RetryableError { .. } | Self::StorageConflict { .. }
        )
    }

    /// The server-directed retry delay carried by a retryable error, if any.
    #[must_use]
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::RetryableError { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_constructor_carries_no_delay_by_default() {
        let err = OrchestrationError::retryable("downstream timed out");
        assert!(err.is_recoverable());
        assert_eq!(err.retry_after(), None);
    }

    #[test]
    fn retryable_after_constructor_carries_delay() {
        let err = OrchestrationError::retryable_after("rate limited", 30);
        assert_eq!(err.retry_after(), Some(30));
    }

    #[test]
    fn permanent_error_is_not_recoverable() {
        let err = OrchestrationError::permanent("bad payload", "E_SCHEMA");
        assert!(!err.is_recoverable());
        assert_eq!(format!("{err}"), "permanent error [E_SCHEMA]: bad payload");
    }

    #[test]
    fn storage_conflict_is_recoverable() {
        let err = OrchestrationError::storage_conflict("step", "abc-123");
        assert!(err.is_recoverable());
    }

    #[test]
    fn guard_failed_display() {
        let err = OrchestrationError::guard_failed("PENDING", "IN_PROGRESS", "dependencies not satisfied");
        assert_eq!(
            format!("{err}"),
            "guard failed: transition PENDING -> IN_PROGRESS rejected: dependencies not satisfied"
        );
    }

    #[test]
    fn unauthorized_not_recoverable() {
        let err = OrchestrationError::unauthorized("task:abc", "cancel");
        assert!(!err.is_recoverable());
    }

    #[test]
    fn duplicate_template_display() {
        let err = OrchestrationError::DuplicateTemplate {
            namespace: "billing".into(),
            name: "charge".into(),
            version: "1.0.0".into(),
        };
        assert_eq!(
            format!("{err}"),
            "duplicate template: (billing, charge, 1.0.0) already registered with a different definition"
        );
    }

    #[test]
    fn unknown_resource_action_display() {
        let err = OrchestrationError::unknown_resource_action("task", "obliterate");
        assert_eq!(
            format!("{err}"),
            "unknown resource/action pair: task/obliterate is not in the resource registry"
        );
    }

    #[test]
    fn from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{bad}").unwrap_err();
        let err: OrchestrationError = json_err.into();
        assert!(matches!(err, OrchestrationError::SerializationError(_)));
    }
}
