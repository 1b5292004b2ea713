//! Multi-factor priority scoring.
//!
//! A task's score combines five independently normalized sub-scores, each in
//! `[0, 1]` where higher means more urgent, using fixed weights that sum to
//! one. Scores are computed fresh for every assignment request.

use super::TaskRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Weight of the task age factor.
pub const AGE_WEIGHT: f64 = 0.35;
/// Weight of the recent repository activity factor.
pub const RECENT_ACTIVITY_WEIGHT: f64 = 0.25;
/// Weight of the average runtime factor.
pub const RUNTIME_WEIGHT: f64 = 0.20;
/// Weight of the repository load factor.
pub const LOAD_WEIGHT: f64 = 0.10;
/// Weight of the task size factor.
pub const SIZE_WEIGHT: f64 = 0.10;

/// Age at which the age factor saturates (seven days).
pub const MAX_AGE_HOURS: f64 = 168.0;
/// Time since last success after which activity counts as stale (seven days).
pub const MAX_RECENT_HOURS: f64 = 168.0;
/// Runtime at which the runtime factor bottoms out (forty minutes).
pub const MAX_RUNTIME_MS: f64 = 2_400_000.0;
/// Active task count at which the load factor bottoms out.
pub const MAX_PENDING_TASKS: f64 = 10.0;
/// Size at which the size factor bottoms out (one MiB).
pub const MAX_SIZE_BYTES: f64 = 1_048_576.0;
/// Sub-score used when a metric is unknown.
pub const UNKNOWN_SUBSCORE: f64 = 0.5;

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

/// Sub-score, weight and weighted contribution of one factor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FactorScore {
    /// Normalized sub-score in `[0, 1]`.
    pub subscore: f64,
    /// Fixed factor weight.
    pub weight: f64,
    /// `subscore * weight`.
    pub weighted: f64,
}

impl FactorScore {
    #[expect(clippy::float_arithmetic, reason = "weighted contribution")]
    fn new(subscore: f64, weight: f64) -> Self {
        Self {
            subscore,
            weight,
            weighted: subscore * weight,
        }
    }
}

/// Per-factor breakdown with the raw metric that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "factor", rename_all = "snake_case")]
pub enum FactorBreakdown {
    /// Task age.
    Age {
        /// Hours since creation; `None` when the creation time is unknown.
        age_hours: Option<f64>,
        /// Factor contribution.
        #[serde(flatten)]
        score: FactorScore,
    },
    /// Recent repository activity.
    RecentActivity {
        /// Hours since the last success; `None` when there never was one.
        hours_since_success: Option<f64>,
        /// Factor contribution.
        #[serde(flatten)]
        score: FactorScore,
    },
    /// Average repository runtime.
    Runtime {
        /// Cached average runtime.
        avg_runtime_ms: i64,
        /// Factor contribution.
        #[serde(flatten)]
        score: FactorScore,
    },
    /// Current repository load.
    Load {
        /// Cached active task count.
        pending_tasks_count: i64,
        /// Factor contribution.
        #[serde(flatten)]
        score: FactorScore,
    },
    /// Task size.
    Size {
        /// Size hint of the work unit.
        size_bytes: i64,
        /// Factor contribution.
        #[serde(flatten)]
        score: FactorScore,
    },
}

impl FactorBreakdown {
    /// Returns the factor contribution.
    #[must_use]
    pub const fn score(&self) -> &FactorScore {
        match self {
            Self::Age { score, .. }
            | Self::RecentActivity { score, .. }
            | Self::Runtime { score, .. }
            | Self::Load { score, .. }
            | Self::Size { score, .. } => score,
        }
    }
}

/// Full explanation of a task's score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreExplanation {
    /// Final clamped score, identical to [`score`].
    pub total: f64,
    /// Breakdown in the order age, activity, runtime, load, size.
    pub factors: [FactorBreakdown; 5],
}

/// Computes the priority score of a task at `now`.
#[must_use]
pub fn score(task: &TaskRecord, now: DateTime<Utc>) -> f64 {
    explain(task, now).total
}

/// Computes the score of a task together with its per-factor breakdown.
#[must_use]
pub fn explain(task: &TaskRecord, now: DateTime<Utc>) -> ScoreExplanation {
    let age_hours = task.created_at().map(|created| hours_between(created, now));
    let hours_since_success = task.last_success_at().map(|last| hours_between(last, now));

    let factors = [
        FactorBreakdown::Age {
            age_hours,
            score: FactorScore::new(normalize_age(age_hours), AGE_WEIGHT),
        },
        FactorBreakdown::RecentActivity {
            hours_since_success,
            score: FactorScore::new(
                normalize_recent_activity(hours_since_success),
                RECENT_ACTIVITY_WEIGHT,
            ),
        },
        FactorBreakdown::Runtime {
            avg_runtime_ms: task.avg_runtime_ms(),
            score: FactorScore::new(normalize_runtime(task.avg_runtime_ms()), RUNTIME_WEIGHT),
        },
        FactorBreakdown::Load {
            pending_tasks_count: task.pending_tasks_count(),
            score: FactorScore::new(normalize_load(task.pending_tasks_count()), LOAD_WEIGHT),
        },
        FactorBreakdown::Size {
            size_bytes: task.size_bytes(),
            score: FactorScore::new(normalize_size(task.size_bytes()), SIZE_WEIGHT),
        },
    ];

    let total = factors
        .iter()
        .map(|factor| factor.score().weighted)
        .sum::<f64>()
        .clamp(0.0, 1.0);

    ScoreExplanation { total, factors }
}

#[expect(clippy::float_arithmetic, reason = "duration to fractional hours")]
#[expect(clippy::cast_precision_loss, reason = "sub-millisecond precision is irrelevant")]
fn hours_between(earlier: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (now - earlier).num_milliseconds() as f64 / MILLIS_PER_HOUR
}

#[expect(clippy::float_arithmetic, reason = "linear normalization")]
fn normalize_age(age_hours: Option<f64>) -> f64 {
    age_hours.map_or(UNKNOWN_SUBSCORE, |hours| {
        (hours / MAX_AGE_HOURS).clamp(0.0, 1.0)
    })
}

#[expect(clippy::float_arithmetic, reason = "linear normalization")]
fn normalize_recent_activity(hours_since_success: Option<f64>) -> f64 {
    hours_since_success.map_or(0.0, |hours| {
        (1.0 - hours / MAX_RECENT_HOURS).clamp(0.0, 1.0)
    })
}

fn normalize_runtime(avg_runtime_ms: i64) -> f64 {
    if avg_runtime_ms <= 0 {
        return UNKNOWN_SUBSCORE;
    }
    inverse_ratio(avg_runtime_ms, MAX_RUNTIME_MS)
}

fn normalize_load(pending_tasks_count: i64) -> f64 {
    inverse_ratio(pending_tasks_count.max(0), MAX_PENDING_TASKS)
}

fn normalize_size(size_bytes: i64) -> f64 {
    if size_bytes <= 0 {
        return UNKNOWN_SUBSCORE;
    }
    inverse_ratio(size_bytes, MAX_SIZE_BYTES)
}

#[expect(clippy::float_arithmetic, reason = "linear normalization")]
#[expect(clippy::cast_precision_loss, reason = "metrics are far below 2^52")]
fn inverse_ratio(value: i64, max: f64) -> f64 {
    (1.0 - value as f64 / max).clamp(0.0, 1.0)
}
