//! Repository metrics recompute and read-only reporting.

use crate::task::{
    domain::{RepositoryMetrics, RepositoryName, TaskStatus},
    ports::{HistoryFilter, PendingFilter, PendingTaskStore, TaskHistoryStore, TaskStoreResult},
};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Number of recent completions averaged into `avg_runtime_ms`.
pub const DEFAULT_RUNTIME_WINDOW: usize = 10;

/// System-wide counters derived from both collections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemMetrics {
    /// Pending records with status `pending`.
    pub total_pending: u64,
    /// Pending records with status `processing`.
    pub total_processing: u64,
    /// History records with status `completed`.
    pub total_completed: u64,
    /// History records with status `failed`.
    pub total_failed: u64,
    /// Mean runtime over every completed record with a positive runtime.
    pub avg_runtime_ms: i64,
    /// Completed plus failed.
    pub tasks_processed: u64,
    /// Report generation time.
    pub generated_at: DateTime<Utc>,
}

/// Snapshot of the pending collection grouped for operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    /// Every record in the pending collection, cancelled ones included.
    pub total_tasks: u64,
    /// Pending-collection records per repository.
    pub tasks_by_repository: BTreeMap<RepositoryName, u64>,
    /// Pending-collection records per status.
    pub tasks_by_status: BTreeMap<TaskStatus, u64>,
    /// History records with status `completed`.
    pub completed: u64,
    /// History records with status `failed`.
    pub failed: u64,
    /// Mean runtime over completed records with a positive runtime.
    pub avg_runtime_ms: i64,
    /// Report generation time.
    pub generated_at: DateTime<Utc>,
}

/// Recomputes denormalized repository statistics and builds reports.
pub struct RepositoryMetricsService<P, H, C>
where
    P: PendingTaskStore,
    H: TaskHistoryStore,
    C: Clock + Send + Sync,
{
    pending: Arc<P>,
    history: Arc<H>,
    clock: Arc<C>,
    runtime_window: usize,
}

impl<P, H, C> Clone for RepositoryMetricsService<P, H, C>
where
    P: PendingTaskStore,
    H: TaskHistoryStore,
    C: Clock + Send + Sync,
{
    fn clone(&self) -> Self {
        Self {
            pending: Arc::clone(&self.pending),
            history: Arc::clone(&self.history),
            clock: Arc::clone(&self.clock),
            runtime_window: self.runtime_window,
        }
    }
}

impl<P, H, C> RepositoryMetricsService<P, H, C>
where
    P: PendingTaskStore,
    H: TaskHistoryStore,
    C: Clock + Send + Sync,
{
    /// Creates a metrics service averaging over
    /// [`DEFAULT_RUNTIME_WINDOW`] completions.
    #[must_use]
    pub const fn new(pending: Arc<P>, history: Arc<H>, clock: Arc<C>) -> Self {
        Self {
            pending,
            history,
            clock,
            runtime_window: DEFAULT_RUNTIME_WINDOW,
        }
    }

    /// Overrides the number of completions averaged into `avg_runtime_ms`.
    #[must_use]
    pub const fn with_runtime_window(mut self, runtime_window: usize) -> Self {
        self.runtime_window = runtime_window;
        self
    }

    /// Statistics stamped on a newly ingested record: the active task count
    /// plus the assignment time and runtime of the latest completion.
    ///
    /// # Errors
    ///
    /// Returns the store error when either collection cannot be read.
    pub async fn ingestion_snapshot(
        &self,
        repository: &RepositoryName,
    ) -> TaskStoreResult<RepositoryMetrics> {
        let pending_tasks_count = self.active_count(repository).await?;
        let latest = self
            .history
            .latest(&HistoryFilter::completed().in_repository(repository.clone()))
            .await?;
        Ok(RepositoryMetrics {
            last_success_at: latest.as_ref().and_then(|record| record.assigned_at()),
            avg_runtime_ms: latest.map_or(0, |record| record.pipeline_runtime_ms()),
            pending_tasks_count,
        })
    }

    /// Recomputes the repository statistics and writes them onto every
    /// non-cancelled pending record of the repository.
    ///
    /// # Errors
    ///
    /// Returns the store error of the first failing query or write.
    pub async fn recompute(
        &self,
        repository: &RepositoryName,
    ) -> TaskStoreResult<RepositoryMetrics> {
        let completed = HistoryFilter::completed().in_repository(repository.clone());
        let latest = self.history.latest(&completed).await?;
        let avg_runtime_ms = self
            .history
            .average_runtime(&completed, Some(self.runtime_window))
            .await?;
        let metrics = RepositoryMetrics {
            last_success_at: latest.and_then(|record| record.assigned_at()),
            avg_runtime_ms,
            pending_tasks_count: self.active_count(repository).await?,
        };

        let updated = self
            .pending
            .update_repository_metrics(repository, &metrics)
            .await?;
        debug!(
            repository = %repository,
            updated,
            avg_runtime_ms = metrics.avg_runtime_ms,
            pending_tasks_count = metrics.pending_tasks_count,
            "repository metrics recomputed"
        );
        Ok(metrics)
    }

    /// Builds the system-wide counters.
    ///
    /// # Errors
    ///
    /// Returns the store error of the first failing query.
    pub async fn system_metrics(&self) -> TaskStoreResult<SystemMetrics> {
        let total_pending = self
            .pending
            .count(&PendingFilter::with_status(TaskStatus::Pending))
            .await?;
        let total_processing = self
            .pending
            .count(&PendingFilter::with_status(TaskStatus::Processing))
            .await?;
        let total_completed = self.history.count(&HistoryFilter::completed()).await?;
        let total_failed = self
            .history
            .count(&HistoryFilter::with_status(TaskStatus::Failed))
            .await?;
        let avg_runtime_ms = self
            .history
            .average_runtime(&HistoryFilter::completed(), None)
            .await?;

        Ok(SystemMetrics {
            total_pending,
            total_processing,
            total_completed,
            total_failed,
            avg_runtime_ms,
            tasks_processed: total_completed.saturating_add(total_failed),
            generated_at: self.clock.utc(),
        })
    }

    /// Builds the grouped pending-collection snapshot.
    ///
    /// # Errors
    ///
    /// Returns the store error of the first failing query.
    pub async fn queue_status(&self) -> TaskStoreResult<QueueStatus> {
        let records = self.pending.find(&PendingFilter::all()).await?;
        let mut tasks_by_repository: BTreeMap<RepositoryName, u64> = BTreeMap::new();
        let mut tasks_by_status: BTreeMap<TaskStatus, u64> = BTreeMap::new();
        for record in &records {
            let per_repository = tasks_by_repository
                .entry(record.repository().clone())
                .or_default();
            *per_repository = per_repository.saturating_add(1);
            let per_status = tasks_by_status.entry(record.status()).or_default();
            *per_status = per_status.saturating_add(1);
        }

        let completed = self.history.count(&HistoryFilter::completed()).await?;
        let failed = self
            .history
            .count(&HistoryFilter::with_status(TaskStatus::Failed))
            .await?;
        let avg_runtime_ms = self
            .history
            .average_runtime(&HistoryFilter::completed(), None)
            .await?;

        Ok(QueueStatus {
            total_tasks: u64::try_from(records.len()).unwrap_or(u64::MAX),
            tasks_by_repository,
            tasks_by_status,
            completed,
            failed,
            avg_runtime_ms,
            generated_at: self.clock.utc(),
        })
    }

    async fn active_count(&self, repository: &RepositoryName) -> TaskStoreResult<i64> {
        let count = self
            .pending
            .count(&PendingFilter::active().in_repository(repository.clone()))
            .await?;
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }
}
