/// Lifecycle of a request execution.
///
/// `Idle -> Running -> (Retrying -> Running)* -> Finished`. A finished
/// request may be executed again, which starts a fresh cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionState {
    /// Never executed.
    #[default]
    Idle,

    /// An attempt is queued for a socket or in flight.
    Running,

    /// Sleeping through the backoff before the next attempt.
    Retrying,

    /// The callback has been invoked.
    Finished,
}

impl ExecutionState {
    pub fn is_running(self) -> bool {
        matches!(self, ExecutionState::Running | ExecutionState::Retrying)
    }
}
