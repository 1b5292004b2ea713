//! Queue entries and submissions.

use super::{QueueError, QueueResult};
use crate::task::domain::{RepositoryName, TaskId, TaskNewEvent, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Task held by the in-memory queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedTask {
    /// Task identifier.
    pub id: TaskId,
    /// Issue the task was derived from.
    pub issue_id: String,
    /// Owning repository.
    pub repository: RepositoryName,
    /// Path of the task definition file.
    pub task_file_path: String,
    /// Lifecycle status.
    pub status: TaskStatus,
    /// Submission time.
    pub created_at: DateTime<Utc>,
    /// Time of the last status change.
    pub updated_at: DateTime<Utc>,
    /// Failure detail, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl QueuedTask {
    /// Builds the `task.new` announcement for this task.
    #[must_use]
    pub fn to_new_event(&self) -> TaskNewEvent {
        TaskNewEvent {
            task_id: self.id.clone(),
            issue_id: self.issue_id.clone(),
            repository: self.repository.clone(),
            task_file_path: self.task_file_path.clone(),
            size_bytes: 0,
            created_at: Some(self.created_at),
        }
    }
}

/// Submission of a new task to the queue.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewQueuedTask {
    /// Issue the task was derived from.
    pub issue_id: String,
    /// Owning repository.
    pub repository: String,
    /// Path of the task definition file.
    pub task_file_path: String,
}

impl NewQueuedTask {
    /// Creates a submission.
    #[must_use]
    pub fn new(
        issue_id: impl Into<String>,
        repository: impl Into<String>,
        task_file_path: impl Into<String>,
    ) -> Self {
        Self {
            issue_id: issue_id.into(),
            repository: repository.into(),
            task_file_path: task_file_path.into(),
        }
    }

    /// Validates the submission and produces a pending entry with a fresh
    /// identifier.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::MissingField`] naming the first empty field.
    pub fn into_task(self, now: DateTime<Utc>) -> QueueResult<QueuedTask> {
        if self.issue_id.trim().is_empty() {
            return Err(QueueError::MissingField("issue_id"));
        }
        if self.repository.trim().is_empty() {
            return Err(QueueError::MissingField("repository"));
        }
        if self.task_file_path.trim().is_empty() {
            return Err(QueueError::MissingField("task_file_path"));
        }

        Ok(QueuedTask {
            id: TaskId::generate(),
            issue_id: self.issue_id,
            repository: RepositoryName::new(self.repository),
            task_file_path: self.task_file_path,
            status: TaskStatus::Pending,
            created_at: now,
            updated_at: now,
            error_message: None,
        })
    }
}
