//! Queue submissions reaching the pending collection.

use super::helpers::{REPOSITORY, pending, start};
use eyre::{OptionExt, ensure};
use rstest::rstest;
use taskrank::queue::{NewQueuedTask, QueueError};
use taskrank::task::domain::TaskStatus;

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn submitted_task_is_queued_and_ingested() -> eyre::Result<()> {
    let coordinator = start().await?;

    let queued = coordinator
        .producer()
        .submit(NewQueuedTask::new("issue-7", REPOSITORY, "tasks/issue-7.md"))
        .await?;
    coordinator.pump().await?;

    ensure!(coordinator.queue().len() == 1, "task queued locally");
    let record = pending(&coordinator, queued.id.as_str())
        .await?
        .ok_or_eyre("submitted task should be ingested")?;
    ensure!(record.issue_id() == "issue-7", "issue carried over");
    ensure!(record.status() == TaskStatus::Pending, "ingested as pending");
    ensure!(record.created_at() == Some(queued.created_at), "creation time kept");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn republishing_a_queued_task_is_rejected() -> eyre::Result<()> {
    let coordinator = start().await?;
    let queued = coordinator
        .producer()
        .submit(NewQueuedTask::new("issue-8", REPOSITORY, "tasks/issue-8.md"))
        .await?;

    let replay = coordinator.producer().publish(&queued).await;

    ensure!(
        matches!(replay, Err(QueueError::DuplicateSubmission(ref id)) if *id == queued.id),
        "replay reported as duplicate: {replay:?}"
    );
    ensure!(coordinator.queue().len() == 1, "queued once");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn worker_progress_is_tracked_on_the_queue() -> eyre::Result<()> {
    let coordinator = start().await?;
    let queue = coordinator.queue();
    coordinator
        .producer()
        .submit(NewQueuedTask::new("issue-9", REPOSITORY, "tasks/issue-9.md"))
        .await?;

    let current = queue.dequeue().ok_or_eyre("one task queued")?;
    queue.set_current(Some(current.clone()));
    queue
        .update_status(&current.id, TaskStatus::Processing, None)
        .await?;

    ensure!(queue.is_empty(), "dequeued");
    ensure!(
        queue.count_by_status(TaskStatus::Processing) == 1,
        "current task counted"
    );
    ensure!(
        queue.get_by_id(&current.id).map(|task| task.status) == Some(TaskStatus::Processing),
        "current task found by id"
    );
    Ok(())
}
