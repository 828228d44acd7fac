//! The task and step state machines: a shared state vocabulary
//! (`crate::model::ExecutionState`), an explicit transition table per
//! entity, one business guard each, idempotent-no-op handling, and a
//! transactional append-only persistence layer.

pub mod events;
pub mod step;
pub mod task;

pub use events::{step_transition_event, task_transition_event, StepEventPayload, StepEventPayloadBuilder};
