use serde::{Deserialize, Serialize};

/// Configuration for the authorization boundary. The coordinator and user
/// types named here are host-application collaborators; this crate only
/// consumes `enabled` to decide whether `AuthorizationCoordinator::can`
/// short-circuits to `true`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AuthConfig {
    /// Identifies the authorization strategy in effect; opaque to this
    /// crate, passed through to the concrete coordinator.
    pub strategy: String,
    /// When `false`, every `can` check passes unconditionally and
    /// `authorize` never raises `Unauthorized`.
    pub enabled: bool,
    /// Fully-qualified reference to the concrete coordinator type the host
    /// application wires in; this crate never constructs one.
    pub coordinator_class: String,
    /// Fully-qualified reference to the concrete user/principal type
    /// carried in the authorization context.
    pub user_class: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            strategy: "none".to_string(),
            enabled: false,
            coordinator_class: String::new(),
            user_class: String::new(),
        }
    }
}
