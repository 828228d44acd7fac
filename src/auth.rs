//! # Authorization Coordinator Interface
//!
//! The core depends on authorization only at this narrow boundary: a
//! resource/action policy check consulted before a caller-facing operation
//! (cancelling a task, resolving a step manually, and similar). The
//! concrete coordinator — whatever makes the actual allow/deny decision —
//! is a host-application collaborator and is never implemented here; this
//! module defines the trait it must satisfy and the resource registry that
//! validates a (resource, action) pair is one the engine actually knows
//! about.

use async_trait::async_trait;

use crate::config::AuthConfig;
use crate::error::{OrchestrationError, OrchestrationResult};

/// The resources and actions an authorization coordinator may be asked
/// about. Checking an unregistered pair is a programming error in the
/// caller, not a policy decision, and is rejected before reaching the
/// coordinator.
#[derive(Debug, Clone, Default)]
pub struct ResourceRegistry {
    known: std::collections::HashSet<(String, String)>,
}

impl ResourceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn register(mut self, resource: impl Into<String>, action: impl Into<String>) -> Self {
        self.known.insert((resource.into(), action.into()));
        self
    }

    #[must_use]
    pub fn contains(&self, resource: &str, action: &str) -> bool {
        self.known.contains(&(resource.to_string(), action.to_string()))
    }

    /// The default registry for the operations this core itself exposes to
    /// callers: task cancellation and manual step/task resolution.
    #[must_use]
    pub fn default_registry() -> Self {
        Self::new()
            .register("task", "cancel")
            .register("task", "resolve_manually")
            .register("step", "resolve_manually")
            .register("task", "view")
    }
}

/// Opaque context passed through to the coordinator: the caller's
/// principal plus whatever else a concrete implementation needs to decide.
/// The core never inspects its contents.
pub type AuthorizationContext = serde_json::Value;

/// The interface a host application's authorization coordinator
/// implements. Resources/actions are validated against a
/// [`ResourceRegistry`] before this trait is ever consulted.
#[async_trait]
pub trait AuthorizationCoordinator: Send + Sync {
    async fn can(&self, resource: &str, action: &str, context: &AuthorizationContext) -> bool;

    async fn authorize(
        &self,
        resource: &str,
        action: &str,
        context: &AuthorizationContext,
    ) -> OrchestrationResult<()> {
        if self.can(resource, action, context).await {
            Ok(())
        } else {
            Err(OrchestrationError::unauthorized(resource, action))
        }
    }
}

/// Validates a (resource, action) pair against the registry, then either
/// short-circuits to `true` (authorization disabled) or defers to
/// `coordinator`. This is the single entry point the rest of the engine
/// should call; it is never correct to call a coordinator directly without
/// this registry check in front of it.
pub struct AuthorizationGate<'a> {
    registry: &'a ResourceRegistry,
    config: &'a AuthConfig,
    coordinator: &'a dyn AuthorizationCoordinator,
}

impl std::fmt::Debug for AuthorizationGate<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationGate")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<'a> AuthorizationGate<'a> {
    #[must_use]
    pub fn new(
        registry: &'a ResourceRegistry,
        config: &'a AuthConfig,
        coordinator: &'a dyn AuthorizationCoordinator,
    ) -> Self {
        Self {
            registry,
            config,
            coordinator,
        }
    }

    pub async fn can(&self, resource: &str, action: &str, context: &AuthorizationContext) -> OrchestrationResult<bool> {
        if !self.registry.contains(resource, action) {
            return Err(OrchestrationError::unknown_resource_action(resource, action));
        }
        if !self.config.enabled {
            return Ok(true);
        }
        Ok(self.coordinator.can(resource, action, context).await)
    }

    pub async fn authorize(&self, resource: &str, action: &str, context: &AuthorizationContext) -> OrchestrationResult<()> {
        if self.can(resource, action, context).await? {
            Ok(())
        } else {
            Err(OrchestrationError::unauthorized(resource, action))
        }
    }
}
