//! # Event Bus
//!
//! Synchronous, in-process publish/subscribe over a fixed event catalog. A
//! flat map from event name to subscriber list; no reflection, no dynamic
//! dispatch beyond an ordinary trait object. Subscribers run on the
//! publishing thread; a subscriber that errors is logged and otherwise
//! ignored — it never interrupts the publisher or other subscribers.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{OrchestrationError, OrchestrationResult};

/// The fixed set of event names this engine ever publishes. Declared as a
/// compiled-in table rather than loaded from a file: see the design note on
/// canonical event-map sourcing.
pub const CATALOG: &[&str] = &[
    "step.execution_requested",
    "step.completed",
    "step.failed",
    "step.retry_requested",
    "step.cancelled",
    "step.resolved_manually",
    "task.execution_started",
    "task.completed",
    "task.failed",
    "task.retry_requested",
    "task.cancelled",
    "task.resolved_manually",
];

/// A subscriber callback. Returning `Err` is caught and logged by the bus;
/// it is never propagated to the publisher.
pub trait Subscriber: Send + Sync {
    fn handle(&self, event_name: &str, payload: &serde_json::Value) -> Result<(), String>;
}

impl<F> Subscriber for F
where
    F: Fn(&str, &serde_json::Value) -> Result<(), String> + Send + Sync,
{
    fn handle(&self, event_name: &str, payload: &serde_json::Value) -> Result<(), String> {
        self(event_name, payload)
    }
}

/// The event bus itself: a flat map from event name to its subscribers.
pub struct EventBus {
    subscribers: RwLock<HashMap<&'static str, Vec<Box<dyn Subscriber>>>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: HashMap<&str, usize> = self
            .subscribers
            .read()
            .map(|map| map.iter().map(|(k, v)| (*k, v.len())).collect())
            .unwrap_or_default();
        f.debug_struct("EventBus").field("subscriber_counts", &counts).finish()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        let subscribers = CATALOG.iter().map(|&name| (name, Vec::new())).collect();
        Self {
            subscribers: RwLock::new(subscribers),
        }
    }

    /// Register a subscriber for `event_name`. Fails if `event_name` is not
    /// in the fixed catalog.
    pub fn subscribe(&self, event_name: &str, subscriber: Box<dyn Subscriber>) -> OrchestrationResult<()> {
        let mut subscribers = self
            .subscribers
            .write()
            .map_err(|_| OrchestrationError::ConfigurationError("event bus lock poisoned".into()))?;
        let Some(entry) = subscribers.iter_mut().find(|(name, _)| *name == event_name) else {
            return Err(OrchestrationError::ConfigurationError(format!(
                "unknown event name: {event_name}"
            )));
        };
        entry.1.push(subscriber);
        Ok(())
    }

    /// Publish an event to every registered subscriber, synchronously, on
    /// the calling thread. Unknown event names are rejected up front; a
    /// subscriber error is caught, logged, and swallowed so one bad
    /// observer can never break the publisher or its siblings.
    pub fn publish(&self, event_name: &str, payload: &serde_json::Value) -> OrchestrationResult<()> {
        if !CATALOG.contains(&event_name) {
            return Err(OrchestrationError::ConfigurationError(format!(
                "unknown event name: {event_name}"
            )));
        }
        let subscribers = self
            .subscribers
            .read()
            .map_err(|_| OrchestrationError::ConfigurationError("event bus lock poisoned".into()))?;
        if let Some((_, handlers)) = subscribers.iter().find(|(name, _)| *name == event_name) {
            for handler in handlers {
                if let Err(error) = handler.handle(event_name, payload) {
                    tracing::error!(event_name, error, "event subscriber failed; continuing");
                }
            }
        }
        Ok(())
    }
}
