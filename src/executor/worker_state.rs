//! Explicit per-worker state, replacing introspection on the underlying
//! future/task: each worker in a batch holds one of four states, and the
//! pool shuts down a cancelled batch by polling them rather than cancelling
//! futures directly.

/// The lifecycle of one worker's handling of one step within a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Enqueued but its handler has not started running yet.
    Scheduled,
    /// The handler is currently executing.
    Running,
    /// The handler returned (success or failure) and its transition was
    /// recorded.
    Done,
    /// The worker was cancelled before its handler started.
    Cancelled,
}

impl WorkerState {
    /// A scheduled-but-not-started worker should be cancelled outright: it
    /// has no side effects to unwind.
    #[must_use]
    pub fn should_cancel(self) -> bool {
        self == Self::Scheduled
    }

    /// A running worker must be awaited to completion: cancellation here is
    /// non-preemptive, per the engine's cancellation design.
    #[must_use]
    pub fn should_wait(self) -> bool {
        self == Self::Running
    }

    /// A worker that already finished, or was already cancelled, needs no
    /// further action.
    #[must_use]
    pub fn can_ignore(self) -> bool {
        matches!(self, Self::Done | Self::Cancelled)
    }
}
