//! Optional side store for queue entries.

use super::{QueueError, QueueResult, QueuedTask};
use crate::task::domain::TaskId;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

/// External store receiving best-effort copies of queue writes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QueuePersistence: Send + Sync {
    /// Stores a newly enqueued task.
    async fn save(&self, task: &QueuedTask) -> QueueResult<()>;

    /// Overwrites a stored task.
    async fn update(&self, task: &QueuedTask) -> QueueResult<()>;

    /// Removes a stored task.
    async fn delete(&self, id: &TaskId) -> QueueResult<()>;

    /// Returns every stored task in submission order.
    async fn list_all(&self) -> QueueResult<Vec<QueuedTask>>;
}

/// Map-backed persistence used by tests and single-process deployments.
#[derive(Debug, Clone, Default)]
pub struct InMemoryQueuePersistence {
    tasks: Arc<RwLock<BTreeMap<TaskId, QueuedTask>>>,
}

impl InMemoryQueuePersistence {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueuePersistence for InMemoryQueuePersistence {
    async fn save(&self, task: &QueuedTask) -> QueueResult<()> {
        self.tasks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn update(&self, task: &QueuedTask) -> QueueResult<()> {
        let mut tasks = self.tasks.write().unwrap_or_else(PoisonError::into_inner);
        let Some(stored) = tasks.get_mut(&task.id) else {
            return Err(QueueError::NotFound(task.id.clone()));
        };
        stored.clone_from(task);
        Ok(())
    }

    async fn delete(&self, id: &TaskId) -> QueueResult<()> {
        self.tasks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| QueueError::NotFound(id.clone()))
    }

    async fn list_all(&self) -> QueueResult<Vec<QueuedTask>> {
        let mut tasks: Vec<QueuedTask> = self
            .tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        tasks.sort_by(|left, right| {
            left.created_at
                .cmp(&right.created_at)
                .then_with(|| left.id.cmp(&right.id))
        });
        Ok(tasks)
    }
}
