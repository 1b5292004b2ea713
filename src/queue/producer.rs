//! Announces queued tasks on the event bus.

use super::{NewQueuedTask, QueueError, QueueResult, QueuedTask, TaskQueue};
use crate::task::ports::{EventBus, PublishOutcome};
use mockable::Clock;
use std::sync::Arc;
use tracing::info;

/// Validates submissions, publishes `task.new` and enqueues the task.
///
/// The task identifier doubles as the bus deduplication key, so a retried
/// submission of the same entry is announced at most once.
pub struct TaskProducer<B, C>
where
    B: EventBus + ?Sized,
    C: Clock + Send + Sync,
{
    bus: Arc<B>,
    queue: Arc<TaskQueue<C>>,
    subject: String,
}

impl<B, C> TaskProducer<B, C>
where
    B: EventBus + ?Sized,
    C: Clock + Send + Sync,
{
    /// Creates a producer publishing on `subject`.
    #[must_use]
    pub fn new(bus: Arc<B>, queue: Arc<TaskQueue<C>>, subject: impl Into<String>) -> Self {
        Self {
            bus,
            queue,
            subject: subject.into(),
        }
    }

    /// Validates a submission, then announces and enqueues it.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::MissingField`] for incomplete submissions and
    /// the publish error when the bus rejects the announcement.
    pub async fn submit(&self, request: NewQueuedTask) -> QueueResult<QueuedTask> {
        let task = request.into_task(self.queue.now())?;
        self.publish(&task).await?;
        Ok(task)
    }

    /// Announces an existing entry and enqueues it.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::DuplicateSubmission`] when the bus already
    /// accepted the identifier, [`QueueError::Encode`] when the announcement
    /// cannot be serialized and [`QueueError::Bus`] on transport failure.
    pub async fn publish(&self, task: &QueuedTask) -> QueueResult<()> {
        let payload = serde_json::to_vec(&task.to_new_event())
            .map_err(|err| QueueError::Encode(Arc::new(err)))?;
        let outcome = self
            .bus
            .publish(&self.subject, payload, Some(task.id.as_str()))
            .await?;
        if outcome == PublishOutcome::Duplicate {
            return Err(QueueError::DuplicateSubmission(task.id.clone()));
        }

        info!(task_id = %task.id, subject = %self.subject, "task announced");
        self.queue.enqueue(task.clone()).await;
        Ok(())
    }
}
