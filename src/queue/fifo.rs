//! Lock-guarded FIFO queue.

use super::{QueueError, QueuePersistence, QueueResult, QueuedTask};
use crate::task::domain::{TaskId, TaskStatus};
use crate::task::services::best_effort;
use mockable::{Clock, DefaultClock};
use std::collections::VecDeque;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

/// FIFO task list with a "current task" slot.
///
/// Mutations take the exclusive lock, reads take the shared lock, and the
/// lock is always released before the persistence collaborator is called.
pub struct TaskQueue<C = DefaultClock>
where
    C: Clock + Send + Sync,
{
    state: RwLock<QueueState>,
    persistence: Option<Arc<dyn QueuePersistence>>,
    clock: Arc<C>,
}

#[derive(Debug, Default)]
struct QueueState {
    tasks: VecDeque<QueuedTask>,
    current: Option<QueuedTask>,
}

impl QueueState {
    fn find_mut(&mut self, id: &TaskId) -> Option<&mut QueuedTask> {
        if let Some(position) = self.tasks.iter().position(|task| &task.id == id) {
            return self.tasks.get_mut(position);
        }
        self.current.as_mut().filter(|task| &task.id == id)
    }
}

impl<C> std::fmt::Debug for TaskQueue<C>
where
    C: Clock + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("persistent", &self.persistence.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for TaskQueue<DefaultClock> {
    fn default() -> Self {
        Self::new(Arc::new(DefaultClock))
    }
}

impl<C> TaskQueue<C>
where
    C: Clock + Send + Sync,
{
    /// Creates an empty memory-only queue.
    #[must_use]
    pub fn new(clock: Arc<C>) -> Self {
        Self {
            state: RwLock::new(QueueState::default()),
            persistence: None,
            clock,
        }
    }

    /// Attaches a persistence collaborator.
    #[must_use]
    pub fn with_persistence(mut self, persistence: Arc<dyn QueuePersistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    fn read(&self) -> RwLockReadGuard<'_, QueueState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, QueueState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the current time from the queue's clock.
    #[must_use]
    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.utc()
    }

    /// Appends a task to the back of the queue.
    pub async fn enqueue(&self, task: QueuedTask) {
        self.write().tasks.push_back(task.clone());
        info!(task_id = %task.id, repository = %task.repository, "task enqueued");
        if let Some(persistence) = &self.persistence {
            best_effort("persist enqueued task", persistence.save(&task)).await;
        }
    }

    /// Removes and returns the task at the front of the queue.
    #[must_use]
    pub fn dequeue(&self) -> Option<QueuedTask> {
        self.write().tasks.pop_front()
    }

    /// Finds a queued task, falling back to the current-task slot.
    #[must_use]
    pub fn get_by_id(&self, id: &TaskId) -> Option<QueuedTask> {
        let state = self.read();
        state
            .tasks
            .iter()
            .find(|task| &task.id == id)
            .or_else(|| state.current.as_ref().filter(|task| &task.id == id))
            .cloned()
    }

    /// Changes the status of a queued or current task.
    ///
    /// Terminal statuses are sticky: a task that completed, failed or was
    /// cancelled only accepts its own status again.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::NotFound`] for unknown tasks and
    /// [`QueueError::TerminalStatus`] when the task is already terminal.
    pub async fn update_status(
        &self,
        id: &TaskId,
        status: TaskStatus,
        error_message: Option<String>,
    ) -> QueueResult<QueuedTask> {
        let now = self.clock.utc();
        let updated = {
            let mut state = self.write();
            let task = state
                .find_mut(id)
                .ok_or_else(|| QueueError::NotFound(id.clone()))?;
            if task.status.is_terminal() && task.status != status {
                return Err(QueueError::TerminalStatus {
                    task_id: id.clone(),
                    status: task.status,
                    requested: status,
                });
            }
            task.status = status;
            task.updated_at = now;
            if error_message.is_some() {
                task.error_message = error_message;
            }
            task.clone()
        };

        debug!(task_id = %id, %status, "queued task status updated");
        if let Some(persistence) = &self.persistence {
            best_effort("persist queued task update", persistence.update(&updated)).await;
        }
        Ok(updated)
    }

    /// Removes a task from the queue.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::NotFound`] when no queued task has the
    /// identifier.
    pub async fn remove(&self, id: &TaskId) -> QueueResult<QueuedTask> {
        let removed = {
            let mut state = self.write();
            let position = state
                .tasks
                .iter()
                .position(|task| &task.id == id)
                .ok_or_else(|| QueueError::NotFound(id.clone()))?;
            state
                .tasks
                .remove(position)
                .ok_or_else(|| QueueError::NotFound(id.clone()))?
        };

        debug!(task_id = %id, "task removed from queue");
        if let Some(persistence) = &self.persistence {
            best_effort("delete persisted task", persistence.delete(id)).await;
        }
        Ok(removed)
    }

    /// Counts queued tasks holding `status`, including the current task.
    #[must_use]
    pub fn count_by_status(&self, status: TaskStatus) -> usize {
        let state = self.read();
        state
            .tasks
            .iter()
            .chain(state.current.iter())
            .filter(|task| task.status == status)
            .count()
    }

    /// Returns a snapshot of the queued tasks in order.
    #[must_use]
    pub fn list(&self) -> Vec<QueuedTask> {
        self.read().tasks.iter().cloned().collect()
    }

    /// Returns the number of queued tasks, excluding the current task.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().tasks.len()
    }

    /// Returns `true` when no task is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().tasks.is_empty()
    }

    /// Replaces the current-task slot.
    pub fn set_current(&self, task: Option<QueuedTask>) {
        self.write().current = task;
    }

    /// Returns the task currently being processed.
    #[must_use]
    pub fn current(&self) -> Option<QueuedTask> {
        self.read().current.clone()
    }

    /// Replaces the queued tasks with the persisted copies, returning how
    /// many were loaded. A memory-only queue loads nothing.
    ///
    /// # Errors
    ///
    /// Returns the persistence error when the stored tasks cannot be listed.
    pub async fn load_from_persistence(&self) -> QueueResult<usize> {
        let Some(persistence) = &self.persistence else {
            return Ok(0);
        };
        let tasks = persistence.list_all().await?;
        let loaded = tasks.len();
        self.write().tasks = tasks.into();
        info!(loaded, "queue restored from persistence");
        Ok(loaded)
    }
}
