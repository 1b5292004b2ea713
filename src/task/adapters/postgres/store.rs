//! `PostgreSQL` store implementation for the pending and history collections.

use super::{
    models::{NewHistoryTaskRow, NewPendingTaskRow, TaskRow, TaskStatusChangeset},
    schema::{pending_tasks, task_history},
};
use crate::task::{
    domain::{
        PersistedTaskRecord, RepositoryMetrics, RepositoryName, TaskId, TaskRecord, TaskStatus,
        TaskUpdate, truncated_mean,
    },
    ports::{
        ConditionalUpdate, HistoryFilter, PendingFilter, PendingTaskStore, TaskHistoryStore,
        TaskStoreError, TaskStoreResult,
    },
};
use async_trait::async_trait;
use diesel::pg::{Pg, PgConnection};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::result::{DatabaseErrorKind, Error as DieselError};

/// `PostgreSQL` connection pool type used by task adapters.
pub type TaskPgPool = Pool<ConnectionManager<PgConnection>>;

/// `PostgreSQL`-backed task store implementing both collection ports.
#[derive(Debug, Clone)]
pub struct PostgresTaskStore {
    pool: TaskPgPool,
}

impl PostgresTaskStore {
    /// Creates a new store from a `PostgreSQL` connection pool.
    #[must_use]
    pub const fn new(pool: TaskPgPool) -> Self {
        Self { pool }
    }

    async fn run_blocking<F, T>(&self, f: F) -> TaskStoreResult<T>
    where
        F: FnOnce(&mut PgConnection) -> TaskStoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = pool.get().map_err(TaskStoreError::persistence)?;
            f(&mut connection)
        })
        .await
        .map_err(TaskStoreError::persistence)?
    }
}

#[async_trait]
impl PendingTaskStore for PostgresTaskStore {
    async fn insert_if_absent(&self, record: &TaskRecord) -> TaskStoreResult<()> {
        let task_id = record.task_id().clone();
        let new_row = to_new_row(record);
        self.run_blocking(move |connection| {
            diesel::insert_into(pending_tasks::table)
                .values(&new_row)
                .execute(connection)
                .map_err(|err| map_insert_error(err, task_id))?;
            Ok(())
        })
        .await
    }

    async fn find_by_id(&self, id: &TaskId) -> TaskStoreResult<Option<TaskRecord>> {
        let lookup = id.as_str().to_owned();
        self.run_blocking(move |connection| {
            let row = pending_tasks::table
                .filter(pending_tasks::task_id.eq(lookup))
                .first::<TaskRow>(connection)
                .optional()
                .map_err(TaskStoreError::persistence)?;
            row.map(row_to_record).transpose()
        })
        .await
    }

    async fn find(&self, filter: &PendingFilter) -> TaskStoreResult<Vec<TaskRecord>> {
        let filter = filter.clone();
        self.run_blocking(move |connection| {
            let rows = pending_query(&filter)
                .order(pending_tasks::task_id.asc())
                .load::<TaskRow>(connection)
                .map_err(TaskStoreError::persistence)?;
            rows.into_iter().map(row_to_record).collect()
        })
        .await
    }

    async fn count(&self, filter: &PendingFilter) -> TaskStoreResult<u64> {
        let filter = filter.clone();
        self.run_blocking(move |connection| {
            let total = pending_query(&filter)
                .count()
                .get_result::<i64>(connection)
                .map_err(TaskStoreError::persistence)?;
            Ok(to_count(total))
        })
        .await
    }

    async fn update_conditional(
        &self,
        id: &TaskId,
        update: TaskUpdate,
    ) -> TaskStoreResult<ConditionalUpdate> {
        let lookup = id.as_str().to_owned();
        let expected = status_strings(update.expected_statuses());
        let changeset = to_changeset(update);
        self.run_blocking(move |connection| {
            let updated = diesel::update(
                pending_tasks::table
                    .filter(pending_tasks::task_id.eq(lookup.as_str()))
                    .filter(pending_tasks::status.eq_any(expected)),
            )
            .set(&changeset)
            .get_result::<TaskRow>(connection)
            .optional()
            .map_err(TaskStoreError::persistence)?;

            if let Some(row) = updated {
                return row_to_record(row).map(ConditionalUpdate::Applied);
            }

            let current = pending_tasks::table
                .filter(pending_tasks::task_id.eq(lookup.as_str()))
                .select(pending_tasks::status)
                .first::<String>(connection)
                .optional()
                .map_err(TaskStoreError::persistence)?;
            match current {
                None => Ok(ConditionalUpdate::Missing),
                Some(status) => parse_status(&status).map(ConditionalUpdate::Rejected),
            }
        })
        .await
    }

    async fn delete(&self, id: &TaskId) -> TaskStoreResult<bool> {
        let lookup = id.as_str().to_owned();
        self.run_blocking(move |connection| {
            let removed =
                diesel::delete(pending_tasks::table.filter(pending_tasks::task_id.eq(lookup)))
                    .execute(connection)
                    .map_err(TaskStoreError::persistence)?;
            Ok(removed > 0)
        })
        .await
    }

    async fn update_repository_metrics(
        &self,
        repository: &RepositoryName,
        metrics: &RepositoryMetrics,
    ) -> TaskStoreResult<u64> {
        let repository = repository.as_str().to_owned();
        let metrics = *metrics;
        self.run_blocking(move |connection| {
            let updated = diesel::update(
                pending_tasks::table
                    .filter(pending_tasks::repository.eq(repository))
                    .filter(pending_tasks::status.ne(TaskStatus::Cancelled.as_str())),
            )
            .set((
                pending_tasks::last_success_at.eq(metrics.last_success_at),
                pending_tasks::avg_runtime_ms.eq(metrics.avg_runtime_ms),
                pending_tasks::pending_tasks_count.eq(metrics.pending_tasks_count),
            ))
            .execute(connection)
            .map_err(TaskStoreError::persistence)?;
            Ok(u64::try_from(updated).unwrap_or(u64::MAX))
        })
        .await
    }
}

#[async_trait]
impl TaskHistoryStore for PostgresTaskStore {
    async fn insert_if_absent(&self, record: &TaskRecord) -> TaskStoreResult<()> {
        let task_id = record.task_id().clone();
        let new_row = NewHistoryTaskRow::from(to_new_row(record));
        self.run_blocking(move |connection| {
            diesel::insert_into(task_history::table)
                .values(&new_row)
                .execute(connection)
                .map_err(|err| map_insert_error(err, task_id))?;
            Ok(())
        })
        .await
    }

    async fn find_by_id(&self, id: &TaskId) -> TaskStoreResult<Option<TaskRecord>> {
        let lookup = id.as_str().to_owned();
        self.run_blocking(move |connection| {
            let row = task_history::table
                .filter(task_history::task_id.eq(lookup))
                .first::<TaskRow>(connection)
                .optional()
                .map_err(TaskStoreError::persistence)?;
            row.map(row_to_record).transpose()
        })
        .await
    }

    async fn count(&self, filter: &HistoryFilter) -> TaskStoreResult<u64> {
        let filter = filter.clone();
        self.run_blocking(move |connection| {
            let total = history_query(&filter)
                .count()
                .get_result::<i64>(connection)
                .map_err(TaskStoreError::persistence)?;
            Ok(to_count(total))
        })
        .await
    }

    async fn latest(&self, filter: &HistoryFilter) -> TaskStoreResult<Option<TaskRecord>> {
        let filter = filter.clone();
        self.run_blocking(move |connection| {
            let row = history_query(&filter)
                .filter(task_history::completed_at.is_not_null())
                .order((
                    task_history::completed_at.desc(),
                    task_history::task_id.desc(),
                ))
                .first::<TaskRow>(connection)
                .optional()
                .map_err(TaskStoreError::persistence)?;
            row.map(row_to_record).transpose()
        })
        .await
    }

    async fn average_runtime(
        &self,
        filter: &HistoryFilter,
        last_n: Option<usize>,
    ) -> TaskStoreResult<i64> {
        let filter = filter.clone();
        let limit = last_n.map_or(i64::MAX, |n| i64::try_from(n).unwrap_or(i64::MAX));
        self.run_blocking(move |connection| {
            let runtimes = history_query(&filter)
                .filter(task_history::completed_at.is_not_null())
                .filter(task_history::pipeline_runtime_ms.gt(0))
                .order((
                    task_history::completed_at.desc(),
                    task_history::task_id.desc(),
                ))
                .select(task_history::pipeline_runtime_ms)
                .limit(limit)
                .load::<i64>(connection)
                .map_err(TaskStoreError::persistence)?;
            Ok(truncated_mean(&runtimes))
        })
        .await
    }
}

fn pending_query(filter: &PendingFilter) -> pending_tasks::BoxedQuery<'static, Pg> {
    let mut query = pending_tasks::table.into_boxed();
    if let Some(repository) = filter.repository() {
        query = query.filter(pending_tasks::repository.eq(repository.as_str().to_owned()));
    }
    if let Some(statuses) = filter.status_set() {
        query = query.filter(pending_tasks::status.eq_any(status_strings(statuses)));
    }
    query
}

fn history_query(filter: &HistoryFilter) -> task_history::BoxedQuery<'static, Pg> {
    let mut query = task_history::table.into_boxed();
    if let Some(repository) = filter.repository() {
        query = query.filter(task_history::repository.eq(repository.as_str().to_owned()));
    }
    if let Some(status) = filter.status() {
        query = query.filter(task_history::status.eq(status.as_str()));
    }
    query
}

fn status_strings(statuses: &[TaskStatus]) -> Vec<String> {
    statuses
        .iter()
        .map(|status| status.as_str().to_owned())
        .collect()
}

fn to_count(total: i64) -> u64 {
    u64::try_from(total).unwrap_or(0)
}

fn map_insert_error(err: DieselError, task_id: TaskId) -> TaskStoreError {
    match err {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
            TaskStoreError::DuplicateTask(task_id)
        }
        _ => TaskStoreError::persistence(err),
    }
}

fn parse_status(value: &str) -> TaskStoreResult<TaskStatus> {
    TaskStatus::try_from(value).map_err(TaskStoreError::persistence)
}

fn to_changeset(update: TaskUpdate) -> TaskStatusChangeset {
    let status = update.target_status().as_str().to_owned();
    match update {
        TaskUpdate::Assign { assigned_at } => TaskStatusChangeset {
            status,
            assigned_at: Some(assigned_at),
            cancel_reason: None,
        },
        TaskUpdate::StartProcessing => TaskStatusChangeset {
            status,
            assigned_at: None,
            cancel_reason: None,
        },
        TaskUpdate::Cancel { reason } => TaskStatusChangeset {
            status,
            assigned_at: None,
            cancel_reason: reason,
        },
    }
}

fn to_new_row(record: &TaskRecord) -> NewPendingTaskRow {
    NewPendingTaskRow {
        task_id: record.task_id().as_str().to_owned(),
        issue_id: record.issue_id().to_owned(),
        repository: record.repository().as_str().to_owned(),
        task_file_path: record.task_file_path().to_owned(),
        created_at: record.created_at(),
        last_success_at: record.last_success_at(),
        avg_runtime_ms: record.avg_runtime_ms(),
        pending_tasks_count: record.pending_tasks_count(),
        size_bytes: record.size_bytes(),
        pipeline_runtime_ms: record.pipeline_runtime_ms(),
        assigned_at: record.assigned_at(),
        completed_at: record.completed_at(),
        status: record.status().as_str().to_owned(),
        error_message: record.error_message().map(str::to_owned),
        cancel_reason: record.cancel_reason().map(str::to_owned),
    }
}

fn row_to_record(row: TaskRow) -> TaskStoreResult<TaskRecord> {
    let TaskRow {
        task_id,
        issue_id,
        repository,
        task_file_path,
        created_at,
        last_success_at,
        avg_runtime_ms,
        pending_tasks_count,
        size_bytes,
        pipeline_runtime_ms,
        assigned_at,
        completed_at,
        status,
        error_message,
        cancel_reason,
    } = row;

    let data = PersistedTaskRecord {
        task_id: TaskId::new(task_id).map_err(TaskStoreError::persistence)?,
        issue_id,
        repository: RepositoryName::new(repository),
        task_file_path,
        created_at,
        last_success_at,
        avg_runtime_ms,
        pending_tasks_count,
        size_bytes,
        pipeline_runtime_ms,
        assigned_at,
        completed_at,
        status: parse_status(&status)?,
        error_message,
        cancel_reason,
    };
    Ok(TaskRecord::from_persisted(data))
}
