//! Task record aggregate and lifecycle status types.

use super::{
    ParseTaskStatusError, PipelineCompletedEvent, PipelineOutcome, RepositoryMetrics,
    RepositoryName, TaskDomainError, TaskId, TaskNewEvent,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Task lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task is waiting to be assigned.
    Pending,
    /// Task has been handed to a worker.
    Assigned,
    /// The worker reported that the pipeline is running.
    Processing,
    /// The pipeline finished successfully.
    Completed,
    /// The pipeline finished with an error.
    Failed,
    /// The task was withdrawn before completion.
    Cancelled,
}

impl TaskStatus {
    /// Statuses that count toward a repository's concurrent load.
    pub const ACTIVE: [Self; 3] = [Self::Pending, Self::Assigned, Self::Processing];

    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Assigned => "assigned",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Returns `true` when no further transitions are possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns `true` when the status counts toward repository load.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Assigned | Self::Processing)
    }

    /// Returns `true` when moving from `self` to `target` is permitted.
    ///
    /// Completion is accepted from any active status because a pipeline may
    /// report before the worker has marked the task as processing.
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        match (self, target) {
            (Self::Pending, Self::Assigned)
            | (Self::Assigned, Self::Processing)
            | (
                Self::Pending | Self::Assigned | Self::Processing,
                Self::Completed | Self::Failed | Self::Cancelled,
            ) => true,
            _ => false,
        }
    }
}

impl TryFrom<&str> for TaskStatus {
    type Error = ParseTaskStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "pending" => Ok(Self::Pending),
            "assigned" => Ok(Self::Assigned),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(ParseTaskStatusError(value.to_owned())),
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status change applied to a pending record through a conditional write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskUpdate {
    /// Hand the task to a worker.
    Assign {
        /// Assignment timestamp.
        assigned_at: DateTime<Utc>,
    },
    /// The worker started the pipeline.
    StartProcessing,
    /// Withdraw the task.
    Cancel {
        /// Optional operator-supplied reason.
        reason: Option<String>,
    },
}

impl TaskUpdate {
    /// Returns the status the record holds after the update.
    #[must_use]
    pub const fn target_status(&self) -> TaskStatus {
        match self {
            Self::Assign { .. } => TaskStatus::Assigned,
            Self::StartProcessing => TaskStatus::Processing,
            Self::Cancel { .. } => TaskStatus::Cancelled,
        }
    }

    /// Returns the statuses the record must currently hold for the write to
    /// apply.
    #[must_use]
    pub const fn expected_statuses(&self) -> &'static [TaskStatus] {
        match self {
            Self::Assign { .. } => &[TaskStatus::Pending],
            Self::StartProcessing => &[TaskStatus::Assigned],
            Self::Cancel { .. } => &TaskStatus::ACTIVE,
        }
    }
}

/// Task record stored in the pending or history collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    task_id: TaskId,
    issue_id: String,
    repository: RepositoryName,
    task_file_path: String,
    created_at: Option<DateTime<Utc>>,
    last_success_at: Option<DateTime<Utc>>,
    avg_runtime_ms: i64,
    pending_tasks_count: i64,
    size_bytes: i64,
    pipeline_runtime_ms: i64,
    assigned_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    status: TaskStatus,
    error_message: Option<String>,
    cancel_reason: Option<String>,
}

/// Parameter object for reconstructing a persisted task record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedTaskRecord {
    /// Task identifier.
    pub task_id: TaskId,
    /// Issue the task was derived from.
    pub issue_id: String,
    /// Owning repository.
    pub repository: RepositoryName,
    /// Path of the task definition file.
    pub task_file_path: String,
    /// Producer creation timestamp, if known.
    pub created_at: Option<DateTime<Utc>>,
    /// Cached last successful completion for the repository.
    pub last_success_at: Option<DateTime<Utc>>,
    /// Cached average runtime for the repository.
    pub avg_runtime_ms: i64,
    /// Cached number of active tasks for the repository.
    pub pending_tasks_count: i64,
    /// Size hint of the work unit.
    pub size_bytes: i64,
    /// Measured pipeline runtime, set on completion.
    pub pipeline_runtime_ms: i64,
    /// Assignment timestamp.
    pub assigned_at: Option<DateTime<Utc>>,
    /// Completion timestamp reported by the pipeline.
    pub completed_at: Option<DateTime<Utc>>,
    /// Lifecycle status.
    pub status: TaskStatus,
    /// Failure message reported by the pipeline.
    pub error_message: Option<String>,
    /// Cancellation reason.
    pub cancel_reason: Option<String>,
}

impl TaskRecord {
    /// Creates a pending record from a `task.new` event and the repository
    /// statistics known at ingestion time.
    #[must_use]
    pub fn from_new_event(event: TaskNewEvent, metrics: &RepositoryMetrics) -> Self {
        Self {
            task_id: event.task_id,
            issue_id: event.issue_id,
            repository: event.repository,
            task_file_path: event.task_file_path,
            created_at: event.created_at,
            last_success_at: metrics.last_success_at,
            avg_runtime_ms: metrics.avg_runtime_ms,
            pending_tasks_count: metrics.pending_tasks_count,
            size_bytes: event.size_bytes,
            pipeline_runtime_ms: 0,
            assigned_at: None,
            completed_at: None,
            status: TaskStatus::Pending,
            error_message: None,
            cancel_reason: None,
        }
    }

    /// Reconstructs a record from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedTaskRecord) -> Self {
        Self {
            task_id: data.task_id,
            issue_id: data.issue_id,
            repository: data.repository,
            task_file_path: data.task_file_path,
            created_at: data.created_at,
            last_success_at: data.last_success_at,
            avg_runtime_ms: data.avg_runtime_ms,
            pending_tasks_count: data.pending_tasks_count,
            size_bytes: data.size_bytes,
            pipeline_runtime_ms: data.pipeline_runtime_ms,
            assigned_at: data.assigned_at,
            completed_at: data.completed_at,
            status: data.status,
            error_message: data.error_message,
            cancel_reason: data.cancel_reason,
        }
    }

    /// Returns the task identifier.
    #[must_use]
    pub const fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// Returns the issue identifier.
    #[must_use]
    pub fn issue_id(&self) -> &str {
        &self.issue_id
    }

    /// Returns the owning repository.
    #[must_use]
    pub const fn repository(&self) -> &RepositoryName {
        &self.repository
    }

    /// Returns the task definition file path.
    #[must_use]
    pub fn task_file_path(&self) -> &str {
        &self.task_file_path
    }

    /// Returns the producer creation timestamp, if known.
    #[must_use]
    pub const fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    /// Returns the cached last successful completion for the repository.
    #[must_use]
    pub const fn last_success_at(&self) -> Option<DateTime<Utc>> {
        self.last_success_at
    }

    /// Returns the cached average runtime for the repository.
    #[must_use]
    pub const fn avg_runtime_ms(&self) -> i64 {
        self.avg_runtime_ms
    }

    /// Returns the cached number of active tasks for the repository.
    #[must_use]
    pub const fn pending_tasks_count(&self) -> i64 {
        self.pending_tasks_count
    }

    /// Returns the size hint of the work unit.
    #[must_use]
    pub const fn size_bytes(&self) -> i64 {
        self.size_bytes
    }

    /// Returns the measured pipeline runtime.
    #[must_use]
    pub const fn pipeline_runtime_ms(&self) -> i64 {
        self.pipeline_runtime_ms
    }

    /// Returns the assignment timestamp.
    #[must_use]
    pub const fn assigned_at(&self) -> Option<DateTime<Utc>> {
        self.assigned_at
    }

    /// Returns the completion timestamp reported by the pipeline.
    #[must_use]
    pub const fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Returns the lifecycle status.
    #[must_use]
    pub const fn status(&self) -> TaskStatus {
        self.status
    }

    /// Returns the failure message, if any.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Returns the cancellation reason, if any.
    #[must_use]
    pub fn cancel_reason(&self) -> Option<&str> {
        self.cancel_reason.as_deref()
    }

    /// Applies a conditional status update.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidStatusTransition`] when the record
    /// does not hold one of the statuses the update expects.
    pub fn apply(&mut self, update: TaskUpdate) -> Result<(), TaskDomainError> {
        let target = update.target_status();
        if !update.expected_statuses().contains(&self.status) {
            return Err(self.invalid_transition(target));
        }
        match update {
            TaskUpdate::Assign { assigned_at } => self.assigned_at = Some(assigned_at),
            TaskUpdate::StartProcessing => {}
            TaskUpdate::Cancel { reason } => self.cancel_reason = reason,
        }
        self.status = target;
        Ok(())
    }

    /// Records the pipeline outcome, producing the history form of the task.
    ///
    /// `received_at` stands in for the completion time when the event does
    /// not carry one.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidStatusTransition`] when the task has
    /// already reached a terminal status.
    pub fn finalize(
        &mut self,
        event: &PipelineCompletedEvent,
        received_at: DateTime<Utc>,
    ) -> Result<(), TaskDomainError> {
        let target = match event.status {
            PipelineOutcome::Success => TaskStatus::Completed,
            PipelineOutcome::Failure => TaskStatus::Failed,
        };
        if !self.status.can_transition_to(target) {
            return Err(self.invalid_transition(target));
        }

        self.pipeline_runtime_ms = event.pipeline_runtime_ms;
        self.completed_at = Some(event.completed_at.unwrap_or(received_at));
        if target == TaskStatus::Failed {
            self.error_message.clone_from(&event.error_message);
        }
        self.status = target;
        Ok(())
    }

    /// Refreshes the denormalized repository statistics.
    pub fn apply_metrics(&mut self, metrics: &RepositoryMetrics) {
        self.last_success_at = metrics.last_success_at;
        self.avg_runtime_ms = metrics.avg_runtime_ms;
        self.pending_tasks_count = metrics.pending_tasks_count;
    }

    fn invalid_transition(&self, to: TaskStatus) -> TaskDomainError {
        TaskDomainError::InvalidStatusTransition {
            task_id: self.task_id.clone(),
            from: self.status,
            to,
        }
    }
}
