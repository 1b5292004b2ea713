//! Domain model for the task lifecycle.
//!
//! The task domain models pending and history records, the status state
//! machine, the wire events that drive it, and the priority scoring engine,
//! keeping every infrastructure concern outside of the domain boundary.

mod error;
mod event;
mod ids;
mod metrics;
pub mod score;
mod task;

pub use error::{ParseTaskStatusError, TaskDomainError};
pub use event::{PipelineCompletedEvent, PipelineOutcome, TaskNewEvent};
pub use ids::{RepositoryName, TaskId};
pub use metrics::{RepositoryMetrics, truncated_mean};
pub use score::{FactorBreakdown, FactorScore, ScoreExplanation, explain, score};
pub use task::{PersistedTaskRecord, TaskRecord, TaskStatus, TaskUpdate};
