//! Shared builders for task lifecycle tests.

use crate::task::{
    adapters::memory::InMemoryTaskStore,
    domain::{
        PersistedTaskRecord, PipelineCompletedEvent, PipelineOutcome, RepositoryName, TaskId,
        TaskNewEvent, TaskRecord, TaskStatus,
    },
    services::EventIngestionService,
};
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use mockable::DefaultClock;
use std::sync::Arc;

pub type MemoryIngestion = EventIngestionService<InMemoryTaskStore, InMemoryTaskStore, DefaultClock>;

pub const REPOSITORY: &str = "acme/widgets";

pub fn task_id(value: &str) -> TaskId {
    TaskId::new(value).expect("valid task id")
}

pub fn repository() -> RepositoryName {
    RepositoryName::new(REPOSITORY)
}

pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub fn hours_before(now: DateTime<Utc>, hours: i64) -> DateTime<Utc> {
    now - TimeDelta::hours(hours)
}

pub fn ingestion(store: &Arc<InMemoryTaskStore>) -> MemoryIngestion {
    EventIngestionService::new(Arc::clone(store), Arc::clone(store), Arc::new(DefaultClock))
}

pub fn new_event(id: &str) -> TaskNewEvent {
    TaskNewEvent {
        task_id: task_id(id),
        issue_id: format!("issue-{id}"),
        repository: repository(),
        task_file_path: format!("tasks/{id}.md"),
        size_bytes: 2_048,
        created_at: Some(hours_before(Utc::now(), 2)),
    }
}

pub fn completed_event(
    id: &str,
    status: PipelineOutcome,
    pipeline_runtime_ms: i64,
) -> PipelineCompletedEvent {
    PipelineCompletedEvent {
        task_id: task_id(id),
        repository: repository(),
        pipeline_runtime_ms,
        status,
        completed_at: Some(Utc::now()),
        error_message: (status == PipelineOutcome::Failure).then(|| "lint failed".to_owned()),
    }
}

/// Baseline persisted record; tests adjust the public fields they care about.
pub fn persisted(id: &str, status: TaskStatus) -> PersistedTaskRecord {
    PersistedTaskRecord {
        task_id: task_id(id),
        issue_id: format!("issue-{id}"),
        repository: repository(),
        task_file_path: format!("tasks/{id}.md"),
        created_at: None,
        last_success_at: None,
        avg_runtime_ms: 0,
        pending_tasks_count: 0,
        size_bytes: 0,
        pipeline_runtime_ms: 0,
        assigned_at: None,
        completed_at: None,
        status,
        error_message: None,
        cancel_reason: None,
    }
}

pub fn record(data: PersistedTaskRecord) -> TaskRecord {
    TaskRecord::from_persisted(data)
}

/// Finalized history record completed `completed_hours_ago` before
/// [`fixed_now`].
pub fn history_record(
    id: &str,
    status: TaskStatus,
    pipeline_runtime_ms: i64,
    completed_hours_ago: i64,
) -> TaskRecord {
    let now = fixed_now();
    let mut data = persisted(id, status);
    data.pipeline_runtime_ms = pipeline_runtime_ms;
    data.assigned_at = Some(hours_before(now, completed_hours_ago.saturating_add(1)));
    data.completed_at = Some(hours_before(now, completed_hours_ago));
    record(data)
}
