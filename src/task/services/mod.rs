//! Application services for task ingestion, assignment and reporting.

mod assignment;
mod best_effort;
mod consumer;
mod ingestion;
mod metrics;

pub use assignment::{
    Assignment, AssignmentError, AssignmentResult, CancelOutcome, DEFAULT_MAX_ATTEMPTS,
    TaskAssignmentService,
};
pub use best_effort::best_effort;
pub use consumer::IngestionConsumer;
pub use ingestion::EventIngestionService;
pub use metrics::{DEFAULT_RUNTIME_WINDOW, QueueStatus, RepositoryMetricsService, SystemMetrics};
