//! Settlement behaviour of the durable consumers.

use super::helpers::{announce, complete, history, pending, publish, start};
use eyre::{OptionExt, ensure};
use rstest::rstest;
use serde_json::json;
use taskrank::task::ports::{EventBus, PublishOutcome};

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn malformed_payload_is_dropped() -> eyre::Result<()> {
    let coordinator = start().await?;
    let subject = coordinator.config().bus.task_new_subject.clone();
    coordinator
        .bus()
        .publish(&subject, b"{not json".to_vec(), None)
        .await?;
    publish(&coordinator, &subject, &json!({ "task_id": "" }), "empty-id").await?;

    let report = coordinator.pump().await?;

    ensure!(report.dropped == 2, "both payloads dropped: {report:?}");
    ensure!(coordinator.bus().dead_letters()?.is_empty(), "nothing dead-lettered");
    ensure!(coordinator.bus().backlog()? == 0, "no redelivery scheduled");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn orphan_completion_is_dead_lettered() -> eyre::Result<()> {
    let coordinator = start().await?;
    complete(&coordinator, "ghost", "success", 10).await?;

    let report = coordinator.pump().await?;

    let max_deliver = coordinator.config().bus.max_deliver;
    let dead_letters = coordinator.bus().dead_letters()?;
    let dead = dead_letters.first().ok_or_eyre("one dead letter")?;
    ensure!(report.dead_lettered == 1, "attempts exhausted: {report:?}");
    ensure!(dead.deliveries == max_deliver, "delivered max_deliver times");
    ensure!(
        dead.durable_name == coordinator.config().bus.pipeline_completed_durable,
        "dead letter belongs to the completion consumer"
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn early_completion_succeeds_on_redelivery() -> eyre::Result<()> {
    let coordinator = start().await?;
    complete(&coordinator, "t-1", "success", 700).await?;

    let first = coordinator.bus().deliver_pending().await?;
    ensure!(first.redelivering == 1, "completion nak'd: {first:?}");

    announce(&coordinator, "t-1").await?;
    coordinator.pump().await?;

    ensure!(pending(&coordinator, "t-1").await?.is_none(), "relocated");
    ensure!(history(&coordinator, "t-1").await?.is_some(), "recorded");
    ensure!(coordinator.bus().dead_letters()?.is_empty(), "no dead letters");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn zero_timestamps_read_as_unknown() -> eyre::Result<()> {
    let coordinator = start().await?;
    let subject = coordinator.config().bus.task_new_subject.clone();
    let payload = json!({
        "task_id": "t-zero",
        "repository": "acme/widgets",
        "created_at": "0001-01-01T00:00:00Z",
    });
    publish(&coordinator, &subject, &payload, "t-zero").await?;
    coordinator.pump().await?;

    let record = pending(&coordinator, "t-zero")
        .await?
        .ok_or_eyre("t-zero should be pending")?;
    ensure!(record.created_at().is_none(), "zero timestamp is unknown");
    ensure!(record.size_bytes() == 0, "missing size defaults to zero");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn duplicate_publish_is_suppressed() -> eyre::Result<()> {
    let coordinator = start().await?;

    let first = announce(&coordinator, "t-1").await?;
    let second = announce(&coordinator, "t-1").await?;

    ensure!(first == PublishOutcome::Published, "first publish accepted");
    ensure!(second == PublishOutcome::Duplicate, "second publish suppressed");
    ensure!(coordinator.bus().backlog()? == 1, "one message queued");
    Ok(())
}
