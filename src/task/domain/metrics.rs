//! Repository-level statistics denormalized onto pending records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Snapshot of the statistics used to score a repository's tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryMetrics {
    /// Assignment time of the most recently completed task, if any.
    pub last_success_at: Option<DateTime<Utc>>,
    /// Truncated mean runtime of recent successful runs; zero when unknown.
    pub avg_runtime_ms: i64,
    /// Number of tasks in `pending`, `assigned` or `processing`.
    pub pending_tasks_count: i64,
}

/// Truncated arithmetic mean of the given runtimes, or zero when empty.
#[must_use]
pub fn truncated_mean(runtimes: &[i64]) -> i64 {
    let Ok(len) = i64::try_from(runtimes.len()) else {
        return 0;
    };
    if len == 0 {
        return 0;
    }
    let total: i128 = runtimes.iter().copied().map(i128::from).sum();
    #[expect(
        clippy::integer_division,
        reason = "the stored average is defined as a truncated integer mean"
    )]
    let mean = total / i128::from(len);
    i64::try_from(mean).unwrap_or(i64::MAX)
}
