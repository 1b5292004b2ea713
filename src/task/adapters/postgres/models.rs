//! Diesel row models for task persistence.

use super::schema::{pending_tasks, task_history};
use chrono::{DateTime, Utc};
use diesel::prelude::*;

/// Query result row shared by the pending and history tables.
///
/// Both tables declare the same columns in the same order, so one positional
/// row type loads from either.
#[derive(Debug, Clone, Queryable)]
pub struct TaskRow {
    /// Task identifier.
    pub task_id: String,
    /// Issue identifier.
    pub issue_id: String,
    /// Owning repository.
    pub repository: String,
    /// Task definition file path.
    pub task_file_path: String,
    /// Producer creation timestamp.
    pub created_at: Option<DateTime<Utc>>,
    /// Cached last success for the repository.
    pub last_success_at: Option<DateTime<Utc>>,
    /// Cached average runtime.
    pub avg_runtime_ms: i64,
    /// Cached active task count.
    pub pending_tasks_count: i64,
    /// Size hint.
    pub size_bytes: i64,
    /// Measured pipeline runtime.
    pub pipeline_runtime_ms: i64,
    /// Assignment timestamp.
    pub assigned_at: Option<DateTime<Utc>>,
    /// Completion timestamp.
    pub completed_at: Option<DateTime<Utc>>,
    /// Lifecycle status.
    pub status: String,
    /// Failure message.
    pub error_message: Option<String>,
    /// Cancellation reason.
    pub cancel_reason: Option<String>,
}

/// Insert model for pending records.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = pending_tasks)]
pub struct NewPendingTaskRow {
    /// Task identifier.
    pub task_id: String,
    /// Issue identifier.
    pub issue_id: String,
    /// Owning repository.
    pub repository: String,
    /// Task definition file path.
    pub task_file_path: String,
    /// Producer creation timestamp.
    pub created_at: Option<DateTime<Utc>>,
    /// Cached last success for the repository.
    pub last_success_at: Option<DateTime<Utc>>,
    /// Cached average runtime.
    pub avg_runtime_ms: i64,
    /// Cached active task count.
    pub pending_tasks_count: i64,
    /// Size hint.
    pub size_bytes: i64,
    /// Measured pipeline runtime.
    pub pipeline_runtime_ms: i64,
    /// Assignment timestamp.
    pub assigned_at: Option<DateTime<Utc>>,
    /// Completion timestamp.
    pub completed_at: Option<DateTime<Utc>>,
    /// Lifecycle status.
    pub status: String,
    /// Failure message.
    pub error_message: Option<String>,
    /// Cancellation reason.
    pub cancel_reason: Option<String>,
}

/// Insert model for history records.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = task_history)]
pub struct NewHistoryTaskRow {
    /// Task identifier.
    pub task_id: String,
    /// Issue identifier.
    pub issue_id: String,
    /// Owning repository.
    pub repository: String,
    /// Task definition file path.
    pub task_file_path: String,
    /// Producer creation timestamp.
    pub created_at: Option<DateTime<Utc>>,
    /// Cached last success for the repository.
    pub last_success_at: Option<DateTime<Utc>>,
    /// Cached average runtime.
    pub avg_runtime_ms: i64,
    /// Cached active task count.
    pub pending_tasks_count: i64,
    /// Size hint.
    pub size_bytes: i64,
    /// Measured pipeline runtime.
    pub pipeline_runtime_ms: i64,
    /// Assignment timestamp.
    pub assigned_at: Option<DateTime<Utc>>,
    /// Completion timestamp.
    pub completed_at: Option<DateTime<Utc>>,
    /// Terminal status.
    pub status: String,
    /// Failure message.
    pub error_message: Option<String>,
    /// Cancellation reason.
    pub cancel_reason: Option<String>,
}

impl From<NewPendingTaskRow> for NewHistoryTaskRow {
    fn from(row: NewPendingTaskRow) -> Self {
        Self {
            task_id: row.task_id,
            issue_id: row.issue_id,
            repository: row.repository,
            task_file_path: row.task_file_path,
            created_at: row.created_at,
            last_success_at: row.last_success_at,
            avg_runtime_ms: row.avg_runtime_ms,
            pending_tasks_count: row.pending_tasks_count,
            size_bytes: row.size_bytes,
            pipeline_runtime_ms: row.pipeline_runtime_ms,
            assigned_at: row.assigned_at,
            completed_at: row.completed_at,
            status: row.status,
            error_message: row.error_message,
            cancel_reason: row.cancel_reason,
        }
    }
}

/// Status change written by conditional updates. `None` leaves the column
/// untouched.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = pending_tasks)]
pub struct TaskStatusChangeset {
    /// New lifecycle status.
    pub status: String,
    /// Assignment timestamp.
    pub assigned_at: Option<DateTime<Utc>>,
    /// Cancellation reason.
    pub cancel_reason: Option<String>,
}
