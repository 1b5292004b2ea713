//! Bus integration for the ingestion service.

use super::EventIngestionService;
use crate::config::BusConfig;
use crate::task::ports::{
    Delivery, Disposition, EventBus, EventBusResult, MessageHandler, PendingTaskStore,
    SubscriptionSpec, TaskHistoryStore,
};
use async_trait::async_trait;
use mockable::Clock;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{info, warn};

/// Decodes bus deliveries and routes them to the ingestion handlers.
pub struct IngestionConsumer<P, H, C>
where
    P: PendingTaskStore,
    H: TaskHistoryStore,
    C: Clock + Send + Sync,
{
    ingestion: EventIngestionService<P, H, C>,
    bus: BusConfig,
}

impl<P, H, C> IngestionConsumer<P, H, C>
where
    P: PendingTaskStore + 'static,
    H: TaskHistoryStore + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Creates a consumer for the subjects named in `bus`.
    #[must_use]
    pub const fn new(ingestion: EventIngestionService<P, H, C>, bus: BusConfig) -> Self {
        Self { ingestion, bus }
    }

    /// Binds the two durable consumers on `bus`.
    ///
    /// # Errors
    ///
    /// Returns the bus error when either subscription cannot be created.
    pub async fn start<B>(self: Arc<Self>, bus: &B) -> EventBusResult<()>
    where
        B: EventBus + ?Sized,
    {
        let handler: Arc<dyn MessageHandler> = self.clone();
        for (subject, durable_name) in [
            (&self.bus.task_new_subject, &self.bus.task_new_durable),
            (
                &self.bus.pipeline_completed_subject,
                &self.bus.pipeline_completed_durable,
            ),
        ] {
            bus.subscribe(
                SubscriptionSpec {
                    subject: subject.clone(),
                    durable_name: durable_name.clone(),
                    max_deliver: self.bus.max_deliver,
                    ack_wait: self.bus.ack_wait(),
                },
                Arc::clone(&handler),
            )
            .await?;
            info!(subject = %subject, durable = %durable_name, "durable consumer bound");
        }
        Ok(())
    }
}

#[async_trait]
impl<P, H, C> MessageHandler for IngestionConsumer<P, H, C>
where
    P: PendingTaskStore + 'static,
    H: TaskHistoryStore + 'static,
    C: Clock + Send + Sync + 'static,
{
    async fn handle(&self, delivery: &Delivery) -> Disposition {
        if delivery.subject == self.bus.task_new_subject {
            let Some(event) = decode(delivery) else {
                return Disposition::Drop;
            };
            return self.ingestion.handle_task_new(event).await;
        }
        if delivery.subject == self.bus.pipeline_completed_subject {
            let Some(event) = decode(delivery) else {
                return Disposition::Drop;
            };
            return self.ingestion.handle_pipeline_completed(event).await;
        }
        warn!(subject = %delivery.subject, "delivery on unexpected subject");
        Disposition::Drop
    }
}

fn decode<T: DeserializeOwned>(delivery: &Delivery) -> Option<T> {
    serde_json::from_slice(&delivery.payload)
        .inspect_err(|err| {
            warn!(
                subject = %delivery.subject,
                attempt = delivery.attempt,
                error = %err,
                "dropping malformed payload"
            );
        })
        .ok()
}
