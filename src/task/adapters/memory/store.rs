//! In-memory task store covering both the pending and history collections.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::task::{
    domain::{
        RepositoryMetrics, RepositoryName, TaskId, TaskRecord, TaskStatus, TaskUpdate,
        truncated_mean,
    },
    ports::{
        ConditionalUpdate, HistoryFilter, PendingFilter, PendingTaskStore, TaskHistoryStore,
        TaskStoreError, TaskStoreResult,
    },
};

/// Thread-safe in-memory task store.
///
/// Clones share the same underlying collections, so one instance can be
/// handed to every service as both the pending and the history store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTaskStore {
    state: Arc<RwLock<InMemoryTaskState>>,
}

#[derive(Debug, Default)]
struct InMemoryTaskState {
    pending: BTreeMap<TaskId, TaskRecord>,
    history: Vec<TaskRecord>,
    history_ids: HashSet<TaskId>,
}

impl InMemoryTaskStore {
    /// Creates an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> TaskStoreResult<RwLockReadGuard<'_, InMemoryTaskState>> {
        self.state.read().map_err(|err| {
            TaskStoreError::persistence(std::io::Error::other(err.to_string()))
        })
    }

    fn write(&self) -> TaskStoreResult<RwLockWriteGuard<'_, InMemoryTaskState>> {
        self.state.write().map_err(|err| {
            TaskStoreError::persistence(std::io::Error::other(err.to_string()))
        })
    }
}

fn to_count(len: usize) -> u64 {
    u64::try_from(len).unwrap_or(u64::MAX)
}

/// Returns matching history records with a completion time, ordered from
/// oldest to most recent completion. Equal times order by ascending task id.
fn history_by_recency<'a>(
    state: &'a InMemoryTaskState,
    filter: &HistoryFilter,
) -> Vec<&'a TaskRecord> {
    let mut records: Vec<&TaskRecord> = state
        .history
        .iter()
        .filter(|record| record.completed_at().is_some() && filter.matches(record))
        .collect();
    records.sort_by(|left, right| {
        left.completed_at()
            .cmp(&right.completed_at())
            .then_with(|| left.task_id().cmp(right.task_id()))
    });
    records
}

#[async_trait]
impl PendingTaskStore for InMemoryTaskStore {
    async fn insert_if_absent(&self, record: &TaskRecord) -> TaskStoreResult<()> {
        let mut state = self.write()?;
        if state.pending.contains_key(record.task_id()) {
            return Err(TaskStoreError::DuplicateTask(record.task_id().clone()));
        }
        state
            .pending
            .insert(record.task_id().clone(), record.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &TaskId) -> TaskStoreResult<Option<TaskRecord>> {
        let state = self.read()?;
        Ok(state.pending.get(id).cloned())
    }

    async fn find(&self, filter: &PendingFilter) -> TaskStoreResult<Vec<TaskRecord>> {
        let state = self.read()?;
        Ok(state
            .pending
            .values()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect())
    }

    async fn count(&self, filter: &PendingFilter) -> TaskStoreResult<u64> {
        let state = self.read()?;
        let matching = state
            .pending
            .values()
            .filter(|record| filter.matches(record))
            .count();
        Ok(to_count(matching))
    }

    async fn update_conditional(
        &self,
        id: &TaskId,
        update: TaskUpdate,
    ) -> TaskStoreResult<ConditionalUpdate> {
        let mut state = self.write()?;
        let Some(record) = state.pending.get_mut(id) else {
            return Ok(ConditionalUpdate::Missing);
        };
        let current = record.status();
        if record.apply(update).is_err() {
            return Ok(ConditionalUpdate::Rejected(current));
        }
        Ok(ConditionalUpdate::Applied(record.clone()))
    }

    async fn delete(&self, id: &TaskId) -> TaskStoreResult<bool> {
        let mut state = self.write()?;
        Ok(state.pending.remove(id).is_some())
    }

    async fn update_repository_metrics(
        &self,
        repository: &RepositoryName,
        metrics: &RepositoryMetrics,
    ) -> TaskStoreResult<u64> {
        let mut state = self.write()?;
        let mut updated = 0_u64;
        for record in state.pending.values_mut().filter(|record| {
            record.repository() == repository && record.status() != TaskStatus::Cancelled
        }) {
            record.apply_metrics(metrics);
            updated = updated.saturating_add(1);
        }
        Ok(updated)
    }
}

#[async_trait]
impl TaskHistoryStore for InMemoryTaskStore {
    async fn insert_if_absent(&self, record: &TaskRecord) -> TaskStoreResult<()> {
        let mut state = self.write()?;
        if !state.history_ids.insert(record.task_id().clone()) {
            return Err(TaskStoreError::DuplicateTask(record.task_id().clone()));
        }
        state.history.push(record.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &TaskId) -> TaskStoreResult<Option<TaskRecord>> {
        let state = self.read()?;
        Ok(state
            .history
            .iter()
            .find(|record| record.task_id() == id)
            .cloned())
    }

    async fn count(&self, filter: &HistoryFilter) -> TaskStoreResult<u64> {
        let state = self.read()?;
        let matching = state
            .history
            .iter()
            .filter(|record| filter.matches(record))
            .count();
        Ok(to_count(matching))
    }

    async fn latest(&self, filter: &HistoryFilter) -> TaskStoreResult<Option<TaskRecord>> {
        let state = self.read()?;
        Ok(history_by_recency(&state, filter)
            .last()
            .map(|record| (*record).clone()))
    }

    async fn average_runtime(
        &self,
        filter: &HistoryFilter,
        last_n: Option<usize>,
    ) -> TaskStoreResult<i64> {
        let state = self.read()?;
        let runtimes: Vec<i64> = history_by_recency(&state, filter)
            .into_iter()
            .rev()
            .map(TaskRecord::pipeline_runtime_ms)
            .filter(|runtime| *runtime > 0)
            .take(last_n.unwrap_or(usize::MAX))
            .collect();
        Ok(truncated_mean(&runtimes))
    }
}
