//! Repository metrics recompute and reporting tests.

use super::support::{history_record, persisted, record, repository, task_id};
use crate::task::{
    adapters::memory::InMemoryTaskStore,
    domain::{RepositoryName, TaskStatus},
    ports::{HistoryFilter, PendingTaskStore, TaskHistoryStore},
    services::{DEFAULT_RUNTIME_WINDOW, RepositoryMetricsService},
};
use mockable::DefaultClock;
use rstest::{fixture, rstest};
use std::sync::Arc;

type MemoryMetrics = RepositoryMetricsService<InMemoryTaskStore, InMemoryTaskStore, DefaultClock>;

#[fixture]
fn store() -> Arc<InMemoryTaskStore> {
    Arc::new(InMemoryTaskStore::new())
}

fn metrics(store: &Arc<InMemoryTaskStore>) -> MemoryMetrics {
    RepositoryMetricsService::new(Arc::clone(store), Arc::clone(store), Arc::new(DefaultClock))
}

async fn seed_pending(store: &InMemoryTaskStore, id: &str, status: TaskStatus) {
    PendingTaskStore::insert_if_absent(store, &record(persisted(id, status)))
        .await
        .expect("pending insert");
}

async fn seed_history(
    store: &InMemoryTaskStore,
    id: &str,
    status: TaskStatus,
    runtime: i64,
    hours_ago: i64,
) {
    TaskHistoryStore::insert_if_absent(store, &history_record(id, status, runtime, hours_ago))
        .await
        .expect("history insert");
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn recompute_averages_the_most_recent_window(store: Arc<InMemoryTaskStore>) {
    for step in 1..=12_i64 {
        let id = format!("done-{step:02}");
        seed_history(&store, &id, TaskStatus::Completed, step * 1_000, 13 - step).await;
    }
    seed_pending(&store, "t-1", TaskStatus::Pending).await;

    let computed = metrics(&store)
        .recompute(&repository())
        .await
        .expect("recompute");

    assert_eq!(DEFAULT_RUNTIME_WINDOW, 10);
    assert_eq!(computed.avg_runtime_ms, 7_500);
    assert_eq!(computed.pending_tasks_count, 1);
    let latest = history_record("done-12", TaskStatus::Completed, 12_000, 1);
    assert_eq!(computed.last_success_at, latest.assigned_at());

    let refreshed = PendingTaskStore::find_by_id(store.as_ref(), &task_id("t-1"))
        .await
        .expect("lookup")
        .expect("t-1 pending");
    assert_eq!(refreshed.avg_runtime_ms(), 7_500);
    assert_eq!(refreshed.pending_tasks_count(), 1);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn recompute_ignores_failures_and_zero_runtimes(store: Arc<InMemoryTaskStore>) {
    seed_history(&store, "done-1", TaskStatus::Completed, 2_000, 5).await;
    seed_history(&store, "done-2", TaskStatus::Completed, 0, 4).await;
    seed_history(&store, "fail-1", TaskStatus::Failed, 50_000, 1).await;

    let computed = metrics(&store)
        .recompute(&repository())
        .await
        .expect("recompute");

    assert_eq!(computed.avg_runtime_ms, 2_000);
    let latest_success = history_record("done-2", TaskStatus::Completed, 0, 4);
    assert_eq!(computed.last_success_at, latest_success.assigned_at());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn recompute_leaves_cancelled_and_foreign_records_alone(store: Arc<InMemoryTaskStore>) {
    seed_history(&store, "done-1", TaskStatus::Completed, 4_000, 1).await;
    seed_pending(&store, "t-active", TaskStatus::Assigned).await;
    seed_pending(&store, "t-cancelled", TaskStatus::Cancelled).await;
    let mut foreign = persisted("t-foreign", TaskStatus::Pending);
    foreign.repository = RepositoryName::new("acme/other");
    PendingTaskStore::insert_if_absent(store.as_ref(), &record(foreign))
        .await
        .expect("pending insert");

    let computed = metrics(&store)
        .recompute(&repository())
        .await
        .expect("recompute");

    assert_eq!(computed.pending_tasks_count, 1);
    for (id, expected_runtime) in [("t-active", 4_000), ("t-cancelled", 0), ("t-foreign", 0)] {
        let stored = PendingTaskStore::find_by_id(store.as_ref(), &task_id(id))
            .await
            .expect("lookup")
            .expect("record present");
        assert_eq!(stored.avg_runtime_ms(), expected_runtime, "record {id}");
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn ingestion_snapshot_uses_latest_completion(store: Arc<InMemoryTaskStore>) {
    seed_history(&store, "done-1", TaskStatus::Completed, 1_000, 6).await;
    seed_history(&store, "done-2", TaskStatus::Completed, 3_000, 2).await;
    seed_pending(&store, "t-1", TaskStatus::Pending).await;
    seed_pending(&store, "t-2", TaskStatus::Processing).await;

    let snapshot = metrics(&store)
        .ingestion_snapshot(&repository())
        .await
        .expect("snapshot");

    assert_eq!(snapshot.avg_runtime_ms, 3_000);
    assert_eq!(snapshot.pending_tasks_count, 2);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn ingestion_snapshot_for_unknown_repository_is_empty(store: Arc<InMemoryTaskStore>) {
    let snapshot = metrics(&store)
        .ingestion_snapshot(&RepositoryName::new("acme/new"))
        .await
        .expect("snapshot");

    assert_eq!(snapshot.last_success_at, None);
    assert_eq!(snapshot.avg_runtime_ms, 0);
    assert_eq!(snapshot.pending_tasks_count, 0);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn queue_status_groups_pending_records(store: Arc<InMemoryTaskStore>) {
    for id in ["t-1", "t-2", "t-3"] {
        seed_pending(&store, id, TaskStatus::Pending).await;
    }
    seed_history(&store, "done-1", TaskStatus::Completed, 1_000, 3).await;
    seed_history(&store, "done-2", TaskStatus::Completed, 3_000, 2).await;
    seed_history(&store, "fail-1", TaskStatus::Failed, 9_000, 1).await;

    let status = metrics(&store).queue_status().await.expect("queue status");

    assert_eq!(status.total_tasks, 3);
    assert_eq!(status.tasks_by_repository.get(&repository()), Some(&3));
    assert_eq!(status.tasks_by_status.get(&TaskStatus::Pending), Some(&3));
    assert_eq!(status.completed, 2);
    assert_eq!(status.failed, 1);
    assert_eq!(status.avg_runtime_ms, 2_000);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn system_metrics_count_both_collections(store: Arc<InMemoryTaskStore>) {
    seed_pending(&store, "t-1", TaskStatus::Pending).await;
    seed_pending(&store, "t-2", TaskStatus::Pending).await;
    seed_pending(&store, "t-3", TaskStatus::Processing).await;
    seed_pending(&store, "t-4", TaskStatus::Assigned).await;
    seed_history(&store, "done-1", TaskStatus::Completed, 5_000, 2).await;
    seed_history(&store, "fail-1", TaskStatus::Failed, 1_000, 1).await;

    let system = metrics(&store).system_metrics().await.expect("system metrics");

    assert_eq!(system.total_pending, 2);
    assert_eq!(system.total_processing, 1);
    assert_eq!(system.total_completed, 1);
    assert_eq!(system.total_failed, 1);
    assert_eq!(system.tasks_processed, 2);
    assert_eq!(system.avg_runtime_ms, 5_000);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn empty_store_reports_zeroes(store: Arc<InMemoryTaskStore>) {
    let system = metrics(&store).system_metrics().await.expect("system metrics");

    assert_eq!(system.tasks_processed, 0);
    assert_eq!(system.avg_runtime_ms, 0);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn history_recency_breaks_ties_by_task_id(store: Arc<InMemoryTaskStore>) {
    seed_history(&store, "t-b", TaskStatus::Completed, 2_000, 1).await;
    seed_history(&store, "t-a", TaskStatus::Completed, 4_000, 1).await;
    seed_history(&store, "t-old", TaskStatus::Completed, 8_000, 5).await;
    let mut undated = persisted("t-z", TaskStatus::Completed);
    undated.pipeline_runtime_ms = 9_000;
    TaskHistoryStore::insert_if_absent(store.as_ref(), &record(undated))
        .await
        .expect("history insert");

    let latest = TaskHistoryStore::latest(store.as_ref(), &HistoryFilter::all())
        .await
        .expect("latest")
        .expect("dated history exists");
    let newest = store
        .average_runtime(&HistoryFilter::all(), Some(1))
        .await
        .expect("average");
    let recent_pair = store
        .average_runtime(&HistoryFilter::all(), Some(2))
        .await
        .expect("average");
    let everything = store
        .average_runtime(&HistoryFilter::all(), None)
        .await
        .expect("average");

    assert_eq!(latest.task_id(), &task_id("t-b"));
    assert_eq!(newest, 2_000);
    assert_eq!(recent_pair, 3_000);
    assert_eq!(everything, 4_666);
}
