//! Queue error types.

use crate::task::domain::{TaskId, TaskStatus};
use crate::task::ports::EventBusError;
use std::sync::Arc;
use thiserror::Error;

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Errors returned by queue operations.
#[derive(Debug, Clone, Error)]
pub enum QueueError {
    /// No queued or current task has the identifier.
    #[error("task {0} not found in queue")]
    NotFound(TaskId),

    /// A required submission field is empty.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// The task already reached a terminal status.
    #[error("task {task_id} is {status} and cannot move to {requested}")]
    TerminalStatus {
        /// Affected task.
        task_id: TaskId,
        /// Terminal status the task holds.
        status: TaskStatus,
        /// Rejected target status.
        requested: TaskStatus,
    },

    /// The bus already accepted a task with this identifier.
    #[error("task {0} was already published")]
    DuplicateSubmission(TaskId),

    /// Publishing the task announcement failed.
    #[error(transparent)]
    Bus(#[from] EventBusError),

    /// The announcement could not be encoded.
    #[error("failed to encode task announcement: {0}")]
    Encode(Arc<serde_json::Error>),

    /// Persistence collaborator failure.
    #[error("queue persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl QueueError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
