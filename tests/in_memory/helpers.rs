//! Shared helpers for the in-memory end-to-end tests.

use serde_json::{Value, json};
use taskrank::{
    config::ServiceConfig,
    coordinator::Coordinator,
    task::{
        domain::{TaskId, TaskRecord},
        ports::{EventBus, PendingTaskStore, PublishOutcome, TaskHistoryStore},
    },
};

/// Repository used by every scenario.
pub const REPOSITORY: &str = "acme/widgets";

/// Starts the services with default configuration.
///
/// # Errors
///
/// Returns an error if the services cannot be assembled.
pub async fn start() -> eyre::Result<Coordinator> {
    Ok(Coordinator::in_memory(ServiceConfig::default()).await?)
}

/// Builds a `task.new` payload.
#[must_use]
pub fn task_new(task_id: &str) -> Value {
    json!({
        "task_id": task_id,
        "issue_id": format!("issue-{task_id}"),
        "repository": REPOSITORY,
        "task_file_path": format!("tasks/{task_id}.md"),
        "size_bytes": 4_096,
        "created_at": "2026-01-01T09:00:00Z",
    })
}

/// Builds a `pipeline.completed` payload.
#[must_use]
pub fn pipeline_completed(task_id: &str, status: &str, runtime_ms: i64) -> Value {
    json!({
        "task_id": task_id,
        "repository": REPOSITORY,
        "pipeline_runtime_ms": runtime_ms,
        "status": status,
        "completed_at": "2026-01-01T10:00:00Z",
    })
}

/// Publishes `payload` on `subject`, keyed by `dedup_key`.
///
/// # Errors
///
/// Returns an error if the payload cannot be encoded or the bus rejects it.
pub async fn publish(
    coordinator: &Coordinator,
    subject: &str,
    payload: &Value,
    dedup_key: &str,
) -> eyre::Result<PublishOutcome> {
    let body = serde_json::to_vec(payload)?;
    Ok(coordinator
        .bus()
        .publish(subject, body, Some(dedup_key))
        .await?)
}

/// Publishes a `task.new` event on the configured subject.
///
/// # Errors
///
/// Returns an error if the publish fails.
pub async fn announce(coordinator: &Coordinator, task_id: &str) -> eyre::Result<PublishOutcome> {
    let subject = coordinator.config().bus.task_new_subject.clone();
    publish(
        coordinator,
        &subject,
        &task_new(task_id),
        &format!("new-{task_id}"),
    )
    .await
}

/// Publishes a `pipeline.completed` event on the configured subject.
///
/// # Errors
///
/// Returns an error if the publish fails.
pub async fn complete(
    coordinator: &Coordinator,
    task_id: &str,
    status: &str,
    runtime_ms: i64,
) -> eyre::Result<PublishOutcome> {
    let subject = coordinator.config().bus.pipeline_completed_subject.clone();
    publish(
        coordinator,
        &subject,
        &pipeline_completed(task_id, status, runtime_ms),
        &format!("done-{task_id}"),
    )
    .await
}

/// Looks up a task in the pending collection.
///
/// # Errors
///
/// Returns an error if the identifier is invalid or the store fails.
pub async fn pending(coordinator: &Coordinator, task_id: &str) -> eyre::Result<Option<TaskRecord>> {
    let id = TaskId::new(task_id)?;
    Ok(PendingTaskStore::find_by_id(coordinator.store().as_ref(), &id).await?)
}

/// Looks up a task in the history collection.
///
/// # Errors
///
/// Returns an error if the identifier is invalid or the store fails.
pub async fn history(coordinator: &Coordinator, task_id: &str) -> eyre::Result<Option<TaskRecord>> {
    let id = TaskId::new(task_id)?;
    Ok(TaskHistoryStore::find_by_id(coordinator.store().as_ref(), &id).await?)
}
