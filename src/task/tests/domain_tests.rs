//! Unit tests for task identifiers, statuses and record construction.

use super::support::{new_event, persisted, record, task_id};
use crate::task::domain::{
    RepositoryMetrics, RepositoryName, TaskDomainError, TaskId, TaskRecord, TaskStatus,
};
use chrono::Utc;
use rstest::rstest;

#[rstest]
#[case("  task-1  ", "task-1")]
#[case("a", "a")]
fn task_id_is_trimmed(#[case] raw: &str, #[case] expected: &str) {
    let id = TaskId::new(raw).expect("non-empty id");
    assert_eq!(id.as_str(), expected);
}

#[rstest]
#[case("")]
#[case("   ")]
fn blank_task_id_is_rejected(#[case] raw: &str) {
    assert_eq!(TaskId::new(raw), Err(TaskDomainError::EmptyTaskId));
}

#[rstest]
fn generated_task_ids_are_unique() {
    assert_ne!(TaskId::generate(), TaskId::generate());
}

#[rstest]
fn repository_name_is_trimmed() {
    assert_eq!(RepositoryName::new(" acme/widgets ").as_str(), "acme/widgets");
}

#[rstest]
#[case(TaskStatus::Pending)]
#[case(TaskStatus::Assigned)]
#[case(TaskStatus::Processing)]
#[case(TaskStatus::Completed)]
#[case(TaskStatus::Failed)]
#[case(TaskStatus::Cancelled)]
fn status_storage_form_parses_back(#[case] status: TaskStatus) {
    assert_eq!(TaskStatus::try_from(status.as_str()), Ok(status));
    assert_eq!(TaskStatus::try_from(status.as_str().to_uppercase().as_str()), Ok(status));
}

#[rstest]
fn unknown_status_is_rejected() {
    assert!(TaskStatus::try_from("in_progress").is_err());
}

#[rstest]
fn new_record_is_pending_and_carries_repository_statistics() {
    let last_success_at = Some(Utc::now());
    let metrics = RepositoryMetrics {
        last_success_at,
        avg_runtime_ms: 4_200,
        pending_tasks_count: 3,
    };

    let task = TaskRecord::from_new_event(new_event("t-1"), &metrics);

    assert_eq!(task.status(), TaskStatus::Pending);
    assert_eq!(task.task_id(), &task_id("t-1"));
    assert_eq!(task.last_success_at(), last_success_at);
    assert_eq!(task.avg_runtime_ms(), 4_200);
    assert_eq!(task.pending_tasks_count(), 3);
    assert_eq!(task.size_bytes(), 2_048);
    assert_eq!(task.assigned_at(), None);
    assert_eq!(task.completed_at(), None);
}

#[rstest]
fn applying_metrics_replaces_cached_statistics() {
    let mut task = record(persisted("t-2", TaskStatus::Pending));
    task.apply_metrics(&RepositoryMetrics {
        last_success_at: None,
        avg_runtime_ms: 900,
        pending_tasks_count: 7,
    });

    assert_eq!(task.avg_runtime_ms(), 900);
    assert_eq!(task.pending_tasks_count(), 7);
}
