//! Store ports for the pending and history task collections.

use crate::task::domain::{RepositoryMetrics, RepositoryName, TaskId, TaskRecord, TaskStatus, TaskUpdate};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for task store operations.
pub type TaskStoreResult<T> = Result<T, TaskStoreError>;

/// Filter over the pending collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingFilter {
    repository: Option<RepositoryName>,
    statuses: Option<Vec<TaskStatus>>,
}

impl PendingFilter {
    /// Matches every pending record.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Matches records holding the given status.
    #[must_use]
    pub fn with_status(status: TaskStatus) -> Self {
        Self::default().statuses([status])
    }

    /// Matches records that count toward repository load.
    #[must_use]
    pub fn active() -> Self {
        Self::default().statuses(TaskStatus::ACTIVE)
    }

    /// Restricts the filter to one repository.
    #[must_use]
    pub fn in_repository(mut self, repository: RepositoryName) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Restricts the filter to the given statuses.
    #[must_use]
    pub fn statuses(mut self, statuses: impl IntoIterator<Item = TaskStatus>) -> Self {
        self.statuses = Some(statuses.into_iter().collect());
        self
    }

    /// Returns the repository restriction, if any.
    #[must_use]
    pub const fn repository(&self) -> Option<&RepositoryName> {
        self.repository.as_ref()
    }

    /// Returns the status restriction, if any.
    #[must_use]
    pub fn status_set(&self) -> Option<&[TaskStatus]> {
        self.statuses.as_deref()
    }

    /// Returns `true` when the record satisfies the filter.
    #[must_use]
    pub fn matches(&self, record: &TaskRecord) -> bool {
        self.repository
            .as_ref()
            .is_none_or(|repository| repository == record.repository())
            && self
                .statuses
                .as_ref()
                .is_none_or(|statuses| statuses.contains(&record.status()))
    }
}

/// Filter over the history collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryFilter {
    repository: Option<RepositoryName>,
    status: Option<TaskStatus>,
}

impl HistoryFilter {
    /// Matches every history record.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Matches successfully completed records.
    #[must_use]
    pub fn completed() -> Self {
        Self::with_status(TaskStatus::Completed)
    }

    /// Matches records holding the given status.
    #[must_use]
    pub fn with_status(status: TaskStatus) -> Self {
        Self {
            repository: None,
            status: Some(status),
        }
    }

    /// Restricts the filter to one repository.
    #[must_use]
    pub fn in_repository(mut self, repository: RepositoryName) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Returns the repository restriction, if any.
    #[must_use]
    pub const fn repository(&self) -> Option<&RepositoryName> {
        self.repository.as_ref()
    }

    /// Returns the status restriction, if any.
    #[must_use]
    pub const fn status(&self) -> Option<TaskStatus> {
        self.status
    }

    /// Returns `true` when the record satisfies the filter.
    #[must_use]
    pub fn matches(&self, record: &TaskRecord) -> bool {
        self.repository
            .as_ref()
            .is_none_or(|repository| repository == record.repository())
            && self.status.is_none_or(|status| status == record.status())
    }
}

/// Result of a conditional write against a pending record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionalUpdate {
    /// The record matched the expected status and was updated.
    Applied(TaskRecord),
    /// The record exists but holds a status the update does not accept.
    Rejected(TaskStatus),
    /// No pending record exists for the identifier.
    Missing,
}

/// Mutable collection of in-flight tasks, keyed by task identifier.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PendingTaskStore: Send + Sync {
    /// Inserts a record unless one with the same identifier exists.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::DuplicateTask`] when the identifier is
    /// already present.
    async fn insert_if_absent(&self, record: &TaskRecord) -> TaskStoreResult<()>;

    /// Finds a pending record by identifier.
    async fn find_by_id(&self, id: &TaskId) -> TaskStoreResult<Option<TaskRecord>>;

    /// Returns the records matching the filter, ordered by task identifier.
    async fn find(&self, filter: &PendingFilter) -> TaskStoreResult<Vec<TaskRecord>>;

    /// Counts the records matching the filter.
    async fn count(&self, filter: &PendingFilter) -> TaskStoreResult<u64>;

    /// Applies `update` only if the record still holds one of
    /// [`TaskUpdate::expected_statuses`].
    async fn update_conditional(
        &self,
        id: &TaskId,
        update: TaskUpdate,
    ) -> TaskStoreResult<ConditionalUpdate>;

    /// Deletes a record, returning whether one was removed.
    async fn delete(&self, id: &TaskId) -> TaskStoreResult<bool>;

    /// Writes the repository statistics onto every non-cancelled record of
    /// the repository, returning the number of records updated.
    async fn update_repository_metrics(
        &self,
        repository: &RepositoryName,
        metrics: &RepositoryMetrics,
    ) -> TaskStoreResult<u64>;
}

/// Append-mostly collection of finalized tasks.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskHistoryStore: Send + Sync {
    /// Inserts a record unless one with the same identifier exists.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::DuplicateTask`] when the identifier is
    /// already present.
    async fn insert_if_absent(&self, record: &TaskRecord) -> TaskStoreResult<()>;

    /// Finds a history record by identifier.
    async fn find_by_id(&self, id: &TaskId) -> TaskStoreResult<Option<TaskRecord>>;

    /// Counts the records matching the filter.
    async fn count(&self, filter: &HistoryFilter) -> TaskStoreResult<u64>;

    /// Returns the most recently completed record matching the filter.
    async fn latest(&self, filter: &HistoryFilter) -> TaskStoreResult<Option<TaskRecord>>;

    /// Returns the truncated mean `pipeline_runtime_ms` of the most recent
    /// `last_n` matching records with a positive runtime, or of all of them
    /// when `last_n` is `None`. Zero when no record qualifies.
    async fn average_runtime(
        &self,
        filter: &HistoryFilter,
        last_n: Option<usize>,
    ) -> TaskStoreResult<i64>;
}

/// Errors returned by task store implementations.
#[derive(Debug, Clone, Error)]
pub enum TaskStoreError {
    /// A record with the same identifier already exists.
    #[error("duplicate task identifier: {0}")]
    DuplicateTask(TaskId),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl TaskStoreError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }

    /// Returns `true` for uniqueness conflicts.
    #[must_use]
    pub const fn is_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateTask(_))
    }
}
