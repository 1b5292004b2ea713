//! Task selection, cancellation and progress reporting.

use crate::task::{
    domain::{
        RepositoryName, ScoreExplanation, TaskId, TaskRecord, TaskStatus, TaskUpdate, explain,
    },
    ports::{ConditionalUpdate, PendingFilter, PendingTaskStore, TaskStoreError},
};
use chrono::{DateTime, Utc};
use mockable::Clock;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Candidate scans made by [`TaskAssignmentService::select_next`] before
/// reporting contention.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Task handed to a worker along with the score that selected it.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    /// The task, now in status `assigned`.
    pub task: TaskRecord,
    /// Score at selection time.
    pub score: f64,
    /// Per-factor breakdown consistent with `score`.
    pub explanation: ScoreExplanation,
}

/// Outcome of a cancellation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The task moved to `cancelled`.
    Cancelled(TaskRecord),
    /// The task was already terminal; nothing changed.
    AlreadyTerminal(TaskStatus),
}

/// Service-level errors for assignment operations.
#[derive(Debug, Error)]
pub enum AssignmentError {
    /// No pending task matches the request.
    #[error("no eligible pending task")]
    NoEligibleTask,

    /// The task does not exist in the pending collection.
    #[error("task {0} not found")]
    NotFound(TaskId),

    /// The task exists but holds a status the operation cannot start from.
    #[error("task {task_id} is {status}")]
    InvalidStatus {
        /// Affected task.
        task_id: TaskId,
        /// Status the task currently holds.
        status: TaskStatus,
    },

    /// Every candidate of every scan was claimed by a concurrent caller.
    #[error("assignment abandoned after {attempts} contended scans")]
    Contention {
        /// Scans made.
        attempts: u32,
    },

    /// Store operation failed.
    #[error(transparent)]
    Store(#[from] TaskStoreError),
}

/// Result type for assignment operations.
pub type AssignmentResult<T> = Result<T, AssignmentError>;

/// Scores pending tasks and hands out the most urgent one.
#[derive(Clone)]
pub struct TaskAssignmentService<P, C>
where
    P: PendingTaskStore,
    C: Clock + Send + Sync,
{
    pending: Arc<P>,
    clock: Arc<C>,
    max_attempts: u32,
}

impl<P, C> TaskAssignmentService<P, C>
where
    P: PendingTaskStore,
    C: Clock + Send + Sync,
{
    /// Creates an assignment service.
    #[must_use]
    pub const fn new(pending: Arc<P>, clock: Arc<C>) -> Self {
        Self {
            pending,
            clock,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Overrides the number of candidate scans.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Assigns the highest-scoring pending task, optionally restricted to one
    /// repository. Ties go to the smallest task identifier.
    ///
    /// Candidates from one scan are tried in rank order. A lost conditional
    /// write moves on to the next candidate, and the store is scanned again
    /// only once the list is used up, so two callers never receive the same
    /// task.
    ///
    /// # Errors
    ///
    /// Returns [`AssignmentError::NoEligibleTask`] when a scan finds nothing
    /// pending, [`AssignmentError::Contention`] when every candidate of every
    /// scan was claimed elsewhere, and [`AssignmentError::Store`] on
    /// persistence failure.
    pub async fn select_next(
        &self,
        repository: Option<&RepositoryName>,
    ) -> AssignmentResult<Assignment> {
        let mut filter = PendingFilter::with_status(TaskStatus::Pending);
        if let Some(name) = repository {
            filter = filter.in_repository(name.clone());
        }

        for scan in 1..=self.max_attempts {
            let candidates = self.pending.find(&filter).await?;
            let now = self.clock.utc();
            let ranked = rank_candidates(candidates, now);
            if ranked.is_empty() {
                return Err(AssignmentError::NoEligibleTask);
            }

            for (candidate, explanation) in ranked {
                let update = TaskUpdate::Assign { assigned_at: now };
                match self
                    .pending
                    .update_conditional(candidate.task_id(), update)
                    .await?
                {
                    ConditionalUpdate::Applied(task) => {
                        info!(
                            task_id = %task.task_id(),
                            repository = %task.repository(),
                            score = explanation.total,
                            scan,
                            "task assigned"
                        );
                        return Ok(Assignment {
                            task,
                            score: explanation.total,
                            explanation,
                        });
                    }
                    ConditionalUpdate::Rejected(status) => {
                        debug!(
                            task_id = %candidate.task_id(),
                            %status,
                            scan,
                            "lost assignment race, trying next candidate"
                        );
                    }
                    ConditionalUpdate::Missing => {
                        debug!(
                            task_id = %candidate.task_id(),
                            scan,
                            "candidate vanished, trying next candidate"
                        );
                    }
                }
            }
            debug!(scan, "every candidate claimed, rescanning");
        }

        Err(AssignmentError::Contention {
            attempts: self.max_attempts,
        })
    }

    /// Cancels an active task. Cancelling a terminal task is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`AssignmentError::NotFound`] when the task is not pending and
    /// [`AssignmentError::Store`] on persistence failure.
    pub async fn cancel(
        &self,
        task_id: &TaskId,
        reason: Option<String>,
    ) -> AssignmentResult<CancelOutcome> {
        let update = TaskUpdate::Cancel { reason };
        match self.pending.update_conditional(task_id, update).await? {
            ConditionalUpdate::Applied(task) => {
                info!(task_id = %task_id, reason = task.cancel_reason(), "task cancelled");
                Ok(CancelOutcome::Cancelled(task))
            }
            ConditionalUpdate::Rejected(status) => {
                debug!(task_id = %task_id, %status, "cancel ignored for terminal task");
                Ok(CancelOutcome::AlreadyTerminal(status))
            }
            ConditionalUpdate::Missing => Err(AssignmentError::NotFound(task_id.clone())),
        }
    }

    /// Records that the worker started the pipeline for an assigned task.
    ///
    /// # Errors
    ///
    /// Returns [`AssignmentError::NotFound`] for unknown tasks,
    /// [`AssignmentError::InvalidStatus`] unless the task is `assigned`, and
    /// [`AssignmentError::Store`] on persistence failure.
    pub async fn mark_processing(&self, task_id: &TaskId) -> AssignmentResult<TaskRecord> {
        match self
            .pending
            .update_conditional(task_id, TaskUpdate::StartProcessing)
            .await?
        {
            ConditionalUpdate::Applied(task) => {
                info!(task_id = %task_id, "task processing");
                Ok(task)
            }
            ConditionalUpdate::Rejected(status) => Err(AssignmentError::InvalidStatus {
                task_id: task_id.clone(),
                status,
            }),
            ConditionalUpdate::Missing => Err(AssignmentError::NotFound(task_id.clone())),
        }
    }

    /// Explains the current score of a pending task without changing it.
    ///
    /// # Errors
    ///
    /// Returns [`AssignmentError::NotFound`] for unknown tasks and
    /// [`AssignmentError::Store`] on persistence failure.
    pub async fn explain(&self, task_id: &TaskId) -> AssignmentResult<ScoreExplanation> {
        let task = self
            .pending
            .find_by_id(task_id)
            .await?
            .ok_or_else(|| AssignmentError::NotFound(task_id.clone()))?;
        Ok(explain(&task, self.clock.utc()))
    }
}

/// Orders candidates by descending score, then ascending task identifier.
fn rank_candidates(
    candidates: Vec<TaskRecord>,
    now: DateTime<Utc>,
) -> Vec<(TaskRecord, ScoreExplanation)> {
    let mut ranked: Vec<_> = candidates
        .into_iter()
        .map(|task| {
            let explanation = explain(&task, now);
            (task, explanation)
        })
        .collect();
    ranked.sort_by(|(left, left_score), (right, right_score)| {
        right_score
            .total
            .total_cmp(&left_score.total)
            .then_with(|| left.task_id().cmp(right.task_id()))
    });
    ranked
}
