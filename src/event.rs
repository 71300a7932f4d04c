use crate::core::{ExecutionRecord, TaskId, VersionId};

/// Notifications emitted around executions so a caller can fire an execution
/// and observe its completion asynchronously.
#[derive(Debug, Clone)]
pub enum Event {
    /// An execution left the idle state and claimed its version's slot.
    ExecutionStarted { task: TaskId, version: VersionId },

    /// An execution reached a terminal state; the record carries the
    /// response or the classified failure.
    ExecutionFinished { record: ExecutionRecord },
}
