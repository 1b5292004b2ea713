//! Event bus port: durable publish/subscribe with manual acknowledgement.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Result type for event bus operations.
pub type EventBusResult<T> = Result<T, EventBusError>;

/// How a handler wants a delivery to be settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Disposition {
    /// Processing succeeded or the message was a harmless redelivery.
    Ack,
    /// Processing failed transiently; the bus should redeliver.
    Nak,
    /// The message can never be processed; acknowledge without effect.
    Drop,
}

/// One delivery of a bus message to a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Subject the message was published on.
    pub subject: String,
    /// Raw message body.
    pub payload: Vec<u8>,
    /// One-based delivery attempt.
    pub attempt: u32,
}

/// Durable subscription settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionSpec {
    /// Subject to consume.
    pub subject: String,
    /// Durable consumer name surviving subscriber restarts.
    pub durable_name: String,
    /// Maximum delivery attempts before the message is dead-lettered.
    pub max_deliver: u32,
    /// Time the bus waits for a settlement before redelivering.
    pub ack_wait: Duration,
}

/// Outcome of a publish call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The message was accepted.
    Published,
    /// A message with the same deduplication key was already accepted.
    Duplicate,
}

/// Consumer callback invoked for every delivery.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Processes one delivery and reports how to settle it.
    async fn handle(&self, delivery: &Delivery) -> Disposition;
}

/// Durable, at-least-once message bus.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publishes a message, deduplicating on `dedup_key` when given.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::Transport`] when the bus is unreachable.
    async fn publish(
        &self,
        subject: &str,
        payload: Vec<u8>,
        dedup_key: Option<&str>,
    ) -> EventBusResult<PublishOutcome>;

    /// Registers a durable subscription.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::DuplicateSubscription`] when the durable name
    /// is already bound on this subject.
    async fn subscribe(
        &self,
        spec: SubscriptionSpec,
        handler: Arc<dyn MessageHandler>,
    ) -> EventBusResult<()>;
}

/// Errors returned by event bus implementations.
#[derive(Debug, Clone, Error)]
pub enum EventBusError {
    /// The durable consumer already exists on the subject.
    #[error("durable consumer {durable_name} already bound to {subject}")]
    DuplicateSubscription {
        /// Subject of the existing subscription.
        subject: String,
        /// Durable consumer name.
        durable_name: String,
    },

    /// Transport-layer failure.
    #[error("bus transport error: {0}")]
    Transport(Arc<dyn std::error::Error + Send + Sync>),
}

impl EventBusError {
    /// Wraps a transport error.
    pub fn transport(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Transport(Arc::new(err))
    }
}
