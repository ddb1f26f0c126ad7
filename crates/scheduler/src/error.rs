use taskq_core::{TaskId, TaskqError};

/// Scheduler-level faults. Task failures are not among them: a failed task is
/// recorded as `Errored` and the scheduler moves on.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// A completion was reported while no task was processing.
    #[error("no task is currently processing")]
    NoCurrentTask,

    #[error("task {0} is queued but missing from the task record")]
    UnknownTask(TaskId),

    #[error("scheduler service has stopped")]
    ChannelClosed,

    #[error(transparent)]
    Core(#[from] TaskqError),
}
