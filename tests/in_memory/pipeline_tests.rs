//! Full task lifecycles driven through the bus.

use super::helpers::{announce, complete, history, pending, start};
use eyre::{OptionExt, ensure};
use rstest::rstest;
use taskrank::task::domain::{RepositoryName, TaskStatus};

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn task_moves_from_announcement_to_history() -> eyre::Result<()> {
    let coordinator = start().await?;
    announce(&coordinator, "t-1").await?;
    coordinator.pump().await?;

    let ingested = pending(&coordinator, "t-1")
        .await?
        .ok_or_eyre("t-1 should be pending")?;
    ensure!(ingested.status() == TaskStatus::Pending, "fresh task is pending");
    ensure!(ingested.size_bytes() == 4_096, "size hint preserved");

    let assigned = coordinator.assignment().select_next(None).await?;
    ensure!(assigned.task.task_id() == ingested.task_id(), "only task assigned");
    coordinator
        .assignment()
        .mark_processing(assigned.task.task_id())
        .await?;

    complete(&coordinator, "t-1", "success", 42_000).await?;
    let report = coordinator.pump().await?;
    ensure!(report.acked == 1, "completion acknowledged: {report:?}");

    ensure!(pending(&coordinator, "t-1").await?.is_none(), "relocated");
    let finished = history(&coordinator, "t-1")
        .await?
        .ok_or_eyre("t-1 should be in history")?;
    ensure!(finished.status() == TaskStatus::Completed, "completed");
    ensure!(finished.pipeline_runtime_ms() == 42_000, "runtime recorded");
    ensure!(finished.assigned_at().is_some(), "assignment kept");

    let system = coordinator.metrics().system_metrics().await?;
    ensure!(system.tasks_processed == 1, "one task processed");
    ensure!(system.avg_runtime_ms == 42_000, "average over one run");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn redelivered_events_are_applied_once() -> eyre::Result<()> {
    let coordinator = start().await?;
    let subject = coordinator.config().bus.task_new_subject.clone();
    let payload = super::helpers::task_new("t-1");
    super::helpers::publish(&coordinator, &subject, &payload, "first").await?;
    super::helpers::publish(&coordinator, &subject, &payload, "second").await?;
    coordinator.pump().await?;

    complete(&coordinator, "t-1", "failure", 500).await?;
    let resent = super::helpers::pipeline_completed("t-1", "failure", 500);
    let completion_subject = coordinator.config().bus.pipeline_completed_subject.clone();
    super::helpers::publish(&coordinator, &completion_subject, &resent, "retry").await?;
    let report = coordinator.pump().await?;

    ensure!(report.acked == 2, "both deliveries acknowledged: {report:?}");
    let status = coordinator.metrics().queue_status().await?;
    ensure!(status.total_tasks == 0, "nothing left pending");
    ensure!(status.failed == 1, "exactly one failure recorded");
    ensure!(status.completed == 0, "no completion recorded");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn completion_refreshes_sibling_statistics() -> eyre::Result<()> {
    let coordinator = start().await?;
    for id in ["t-1", "t-2", "t-3"] {
        announce(&coordinator, id).await?;
    }
    coordinator.pump().await?;
    let assigned = coordinator.assignment().select_next(None).await?;
    let winner = assigned.task.task_id().as_str().to_owned();

    complete(&coordinator, &winner, "success", 9_000).await?;
    coordinator.pump().await?;

    let status = coordinator.metrics().queue_status().await?;
    ensure!(status.total_tasks == 2, "two tasks remain");
    ensure!(
        status
            .tasks_by_repository
            .get(&RepositoryName::new(super::helpers::REPOSITORY))
            == Some(&2),
        "both remaining tasks grouped under the repository"
    );
    for id in ["t-1", "t-2", "t-3"].into_iter().filter(|id| *id != winner) {
        let sibling = pending(&coordinator, id)
            .await?
            .ok_or_eyre("sibling should stay pending")?;
        ensure!(sibling.avg_runtime_ms() == 9_000, "average refreshed");
        ensure!(sibling.pending_tasks_count() == 2, "load refreshed");
        ensure!(
            sibling.last_success_at() == assigned.task.assigned_at(),
            "last success is the winner's assignment time"
        );
    }
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn cancelled_task_ignores_late_completion() -> eyre::Result<()> {
    let coordinator = start().await?;
    announce(&coordinator, "t-1").await?;
    coordinator.pump().await?;
    let id = pending(&coordinator, "t-1")
        .await?
        .ok_or_eyre("t-1 should be pending")?
        .task_id()
        .clone();
    coordinator
        .assignment()
        .cancel(&id, Some("duplicate issue".to_owned()))
        .await?;

    complete(&coordinator, "t-1", "success", 1_000).await?;
    let report = coordinator.pump().await?;

    ensure!(report.acked == 1, "late completion acknowledged");
    let kept = pending(&coordinator, "t-1")
        .await?
        .ok_or_eyre("cancelled task stays pending")?;
    ensure!(kept.status() == TaskStatus::Cancelled, "still cancelled");
    ensure!(history(&coordinator, "t-1").await?.is_none(), "not relocated");
    Ok(())
}
