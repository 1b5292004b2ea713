//! Services assembled from configuration.

use super::helpers::{announce, task_new};
use eyre::ensure;
use rstest::rstest;
use std::time::Duration;
use taskrank::{
    config::{ConfigError, ServiceConfig},
    coordinator::{CoordinatorError, Deployment},
    task::ports::{EventBus, PublishOutcome},
};

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn missing_database_url_selects_the_in_memory_store() -> eyre::Result<()> {
    let deployment = Deployment::from_config(ServiceConfig::default()).await?;

    let Deployment::InMemory(coordinator) = &deployment else {
        eyre::bail!("expected the in-memory store, got {deployment:?}");
    };
    ensure!(
        announce(coordinator, "t-1").await? == PublishOutcome::Published,
        "bus accepts publishes"
    );
    let report = deployment.pump().await?;
    ensure!(report.acked == 1, "task ingested: {report:?}");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn blank_database_url_is_rejected_before_connecting() -> eyre::Result<()> {
    let config = ServiceConfig {
        database_url: Some("   ".to_owned()),
        ..ServiceConfig::default()
    };

    let result = Deployment::from_config(config).await;

    ensure!(
        matches!(
            result,
            Err(CoordinatorError::Config(ConfigError::Invalid {
                field: "database_url",
                ..
            }))
        ),
        "blank url rejected: {result:?}"
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn bus_uses_the_configured_retention() -> eyre::Result<()> {
    let mut config = ServiceConfig::default();
    config.bus.retention_secs = 90;
    let deployment = Deployment::from_config(config).await?;

    ensure!(
        deployment.bus().retention() == Duration::from_secs(90),
        "retention taken from configuration"
    );
    let subject = deployment.config().bus.task_new_subject.clone();
    let body = serde_json::to_vec(&task_new("t-2"))?;
    deployment.bus().publish(&subject, body, Some("k")).await?;
    ensure!(deployment.bus().retained()? == 1, "message retained");
    Ok(())
}
