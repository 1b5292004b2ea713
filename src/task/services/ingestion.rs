//! Idempotent ingestion of `task.new` and `pipeline.completed` events.
//!
//! Handlers never surface errors. Each one returns a [`Disposition`] so the
//! bus integration decides between acknowledgement and redelivery, and every
//! step tolerates being replayed after a partial failure.

use super::{RepositoryMetricsService, best_effort};
use crate::task::{
    domain::{PipelineCompletedEvent, TaskNewEvent, TaskRecord},
    ports::{Disposition, PendingTaskStore, TaskHistoryStore},
};
use mockable::Clock;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Applies bus events to the pending and history collections.
#[derive(Clone)]
pub struct EventIngestionService<P, H, C>
where
    P: PendingTaskStore,
    H: TaskHistoryStore,
    C: Clock + Send + Sync,
{
    pending: Arc<P>,
    history: Arc<H>,
    metrics: RepositoryMetricsService<P, H, C>,
    clock: Arc<C>,
}

impl<P, H, C> EventIngestionService<P, H, C>
where
    P: PendingTaskStore,
    H: TaskHistoryStore,
    C: Clock + Send + Sync,
{
    /// Creates an ingestion service using the default runtime window for
    /// metrics recompute.
    #[must_use]
    pub fn new(pending: Arc<P>, history: Arc<H>, clock: Arc<C>) -> Self {
        let metrics = RepositoryMetricsService::new(
            Arc::clone(&pending),
            Arc::clone(&history),
            Arc::clone(&clock),
        );
        Self {
            pending,
            history,
            metrics,
            clock,
        }
    }

    /// Replaces the metrics service used after completions.
    #[must_use]
    pub fn with_metrics(mut self, metrics: RepositoryMetricsService<P, H, C>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Creates the pending record for a new task unless it already exists.
    pub async fn handle_task_new(&self, event: TaskNewEvent) -> Disposition {
        let task_id = event.task_id.clone();

        match self.pending.find_by_id(&task_id).await {
            Ok(Some(_)) => {
                debug!(task_id = %task_id, "task already pending, acknowledging redelivery");
                return Disposition::Ack;
            }
            Ok(None) => {}
            Err(err) => {
                warn!(task_id = %task_id, error = %err, "pending lookup failed");
                return Disposition::Nak;
            }
        }

        match self.history.find_by_id(&task_id).await {
            Ok(Some(_)) => {
                debug!(task_id = %task_id, "task already finalized, acknowledging redelivery");
                return Disposition::Ack;
            }
            Ok(None) => {}
            Err(err) => {
                warn!(task_id = %task_id, error = %err, "history lookup failed");
                return Disposition::Nak;
            }
        }

        let snapshot = match self.metrics.ingestion_snapshot(&event.repository).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(
                    task_id = %task_id,
                    repository = %event.repository,
                    error = %err,
                    "repository statistics unavailable"
                );
                return Disposition::Nak;
            }
        };

        let record = TaskRecord::from_new_event(event, &snapshot);
        match self.pending.insert_if_absent(&record).await {
            Ok(()) => {
                info!(
                    task_id = %task_id,
                    repository = %record.repository(),
                    pending_tasks_count = record.pending_tasks_count(),
                    "task ingested"
                );
                Disposition::Ack
            }
            Err(err) if err.is_duplicate() => {
                debug!(task_id = %task_id, "concurrent ingestion won the insert race");
                Disposition::Ack
            }
            Err(err) => {
                warn!(task_id = %task_id, error = %err, "pending insert failed");
                Disposition::Nak
            }
        }
    }

    /// Finalizes a task: writes the history record, removes the pending one
    /// and refreshes the repository statistics.
    pub async fn handle_pipeline_completed(&self, event: PipelineCompletedEvent) -> Disposition {
        let task_id = event.task_id.clone();

        let mut record = match self.pending.find_by_id(&task_id).await {
            Ok(Some(record)) => record,
            Ok(None) => return self.settle_unknown_completion(&event).await,
            Err(err) => {
                warn!(task_id = %task_id, error = %err, "pending lookup failed");
                return Disposition::Nak;
            }
        };

        if let Err(err) = record.finalize(&event, self.clock.utc()) {
            info!(
                task_id = %task_id,
                status = %record.status(),
                error = %err,
                "completion ignored for task in terminal status"
            );
            return Disposition::Ack;
        }

        match self.history.insert_if_absent(&record).await {
            Ok(()) => {}
            Err(err) if err.is_duplicate() => {
                debug!(task_id = %task_id, "history record already written");
            }
            Err(err) => {
                warn!(task_id = %task_id, error = %err, "history insert failed");
                return Disposition::Nak;
            }
        }

        best_effort("delete relocated pending task", self.pending.delete(&task_id)).await;
        best_effort(
            "recompute repository metrics",
            self.metrics.recompute(record.repository()),
        )
        .await;

        info!(
            task_id = %task_id,
            repository = %record.repository(),
            status = %record.status(),
            pipeline_runtime_ms = record.pipeline_runtime_ms(),
            "task finalized"
        );
        Disposition::Ack
    }

    async fn settle_unknown_completion(&self, event: &PipelineCompletedEvent) -> Disposition {
        match self.history.find_by_id(&event.task_id).await {
            Ok(Some(_)) => {
                debug!(task_id = %event.task_id, "completion already recorded");
                Disposition::Ack
            }
            Ok(None) => {
                debug!(
                    task_id = %event.task_id,
                    "completion arrived before the task was ingested"
                );
                Disposition::Nak
            }
            Err(err) => {
                warn!(task_id = %event.task_id, error = %err, "history lookup failed");
                Disposition::Nak
            }
        }
    }
}
