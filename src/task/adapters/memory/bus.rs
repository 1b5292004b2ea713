//! In-memory durable event bus.
//!
//! Mirrors the delivery semantics the services rely on from a durable
//! pub/sub broker: messages are retained per subject, each durable consumer
//! receives every message at least once, naks trigger redelivery until
//! `max_deliver` is exhausted, and exhausted messages are dead-lettered.
//! Retained messages and deduplication keys expire after the retention
//! window and are pruned whenever the bus is published to or subscribed.
//! Deliveries are driven explicitly through [`InMemoryEventBus::deliver_pending`]
//! so tests control interleaving.

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use mockable::{Clock, DefaultClock};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, warn};

use crate::task::ports::{
    Delivery, Disposition, EventBus, EventBusError, EventBusResult, MessageHandler,
    PublishOutcome, SubscriptionSpec,
};

/// Message that exhausted its delivery attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    /// Subject the message was published on.
    pub subject: String,
    /// Durable consumer that gave up on it.
    pub durable_name: String,
    /// Raw message body.
    pub payload: Vec<u8>,
    /// Number of deliveries made.
    pub deliveries: u32,
}

/// Settlement counts for one delivery round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Deliveries acknowledged.
    pub acked: usize,
    /// Deliveries negatively acknowledged and queued for redelivery.
    pub redelivering: usize,
    /// Deliveries dropped as unprocessable.
    pub dropped: usize,
    /// Deliveries that exhausted their attempts.
    pub dead_lettered: usize,
}

impl DeliveryReport {
    /// Total number of deliveries made in the round.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.acked + self.redelivering + self.dropped + self.dead_lettered
    }
}

/// Retention applied by [`InMemoryEventBus::new`]: seven days.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Thread-safe in-memory event bus.
pub struct InMemoryEventBus<C = DefaultClock>
where
    C: Clock + Send + Sync,
{
    state: Arc<Mutex<BusState>>,
    clock: Arc<C>,
    retention: TimeDelta,
}

#[derive(Default)]
struct BusState {
    seen_keys: HashMap<String, DateTime<Utc>>,
    retained: VecDeque<RetainedMessage>,
    subscriptions: Vec<Subscription>,
    dead_letters: Vec<DeadLetter>,
}

impl BusState {
    /// Forgets retained messages and deduplication keys recorded at or
    /// before `cutoff`.
    fn prune(&mut self, cutoff: DateTime<Utc>) {
        let retained_before = self.retained.len();
        self.retained.retain(|message| message.published_at > cutoff);
        let keys_before = self.seen_keys.len();
        self.seen_keys.retain(|_, seen_at| *seen_at > cutoff);

        let expired_messages = retained_before.saturating_sub(self.retained.len());
        let expired_keys = keys_before.saturating_sub(self.seen_keys.len());
        if expired_messages > 0 || expired_keys > 0 {
            debug!(expired_messages, expired_keys, "retention window pruned");
        }
    }
}

struct RetainedMessage {
    subject: String,
    payload: Vec<u8>,
    published_at: DateTime<Utc>,
}

struct Subscription {
    spec: SubscriptionSpec,
    handler: Arc<dyn MessageHandler>,
    queue: VecDeque<QueuedMessage>,
}

#[derive(Clone)]
struct QueuedMessage {
    payload: Vec<u8>,
    deliveries: u32,
}

struct WorkItem {
    subscription: usize,
    handler: Arc<dyn MessageHandler>,
    message: QueuedMessage,
}

impl<C> Clone for InMemoryEventBus<C>
where
    C: Clock + Send + Sync,
{
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            clock: Arc::clone(&self.clock),
            retention: self.retention,
        }
    }
}

impl<C> std::fmt::Debug for InMemoryEventBus<C>
where
    C: Clock + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryEventBus")
            .field("retention", &self.retention)
            .finish_non_exhaustive()
    }
}

impl Default for InMemoryEventBus<DefaultClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEventBus<DefaultClock> {
    /// Creates an empty bus with the [`DEFAULT_RETENTION`] window.
    #[must_use]
    pub fn new() -> Self {
        Self::with_retention(Arc::new(DefaultClock), DEFAULT_RETENTION)
    }
}

impl<C> InMemoryEventBus<C>
where
    C: Clock + Send + Sync,
{
    /// Creates an empty bus that forgets messages and deduplication keys
    /// older than `retention`, as measured by `clock`.
    #[must_use]
    pub fn with_retention(clock: Arc<C>, retention: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(BusState::default())),
            clock,
            retention: TimeDelta::from_std(retention).unwrap_or(TimeDelta::MAX),
        }
    }

    /// Returns the configured retention window.
    #[must_use]
    pub fn retention(&self) -> Duration {
        self.retention.to_std().unwrap_or(Duration::MAX)
    }

    /// Returns the number of messages retained for replay to new
    /// subscribers.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::Transport`] when the bus state is poisoned.
    pub fn retained(&self) -> EventBusResult<usize> {
        Ok(self.lock()?.retained.len())
    }

    fn lock_pruned(&self) -> EventBusResult<(MutexGuard<'_, BusState>, DateTime<Utc>)> {
        let now = self.clock.utc();
        let mut state = self.lock()?;
        if let Some(cutoff) = now.checked_sub_signed(self.retention) {
            state.prune(cutoff);
        }
        Ok((state, now))
    }

    fn lock(&self) -> EventBusResult<MutexGuard<'_, BusState>> {
        self.state
            .lock()
            .map_err(|err| EventBusError::transport(std::io::Error::other(err.to_string())))
    }

    /// Returns messages that exhausted their delivery attempts.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::Transport`] when the bus state is poisoned.
    pub fn dead_letters(&self) -> EventBusResult<Vec<DeadLetter>> {
        Ok(self.lock()?.dead_letters.clone())
    }

    /// Returns the number of messages awaiting delivery across consumers.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::Transport`] when the bus state is poisoned.
    pub fn backlog(&self) -> EventBusResult<usize> {
        Ok(self
            .lock()?
            .subscriptions
            .iter()
            .map(|subscription| subscription.queue.len())
            .sum())
    }

    /// Delivers every queued message once and settles it according to the
    /// handler's [`Disposition`].
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::Transport`] when the bus state is poisoned.
    pub async fn deliver_pending(&self) -> EventBusResult<DeliveryReport> {
        let work = self.take_work()?;
        let mut report = DeliveryReport::default();

        for item in work {
            let WorkItem {
                subscription,
                handler,
                mut message,
            } = item;
            message.deliveries = message.deliveries.saturating_add(1);
            let delivery = {
                let state = self.lock()?;
                let Some(target) = state.subscriptions.get(subscription) else {
                    continue;
                };
                Delivery {
                    subject: target.spec.subject.clone(),
                    payload: message.payload.clone(),
                    attempt: message.deliveries,
                }
            };

            let disposition = handler.handle(&delivery).await;
            self.settle(subscription, message, disposition, &mut report)?;
        }

        Ok(report)
    }

    /// Runs delivery rounds until nothing is left to deliver or `max_rounds`
    /// is reached, returning the accumulated report.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::Transport`] when the bus state is poisoned.
    pub async fn run_until_idle(&self, max_rounds: usize) -> EventBusResult<DeliveryReport> {
        let mut total = DeliveryReport::default();
        for _ in 0..max_rounds {
            let round = self.deliver_pending().await?;
            if round.total() == 0 {
                break;
            }
            total.acked += round.acked;
            total.redelivering += round.redelivering;
            total.dropped += round.dropped;
            total.dead_lettered += round.dead_lettered;
        }
        Ok(total)
    }

    fn take_work(&self) -> EventBusResult<Vec<WorkItem>> {
        let mut state = self.lock()?;
        let mut work = Vec::new();
        for (index, subscription) in state.subscriptions.iter_mut().enumerate() {
            work.extend(subscription.queue.drain(..).map(|message| WorkItem {
                subscription: index,
                handler: Arc::clone(&subscription.handler),
                message,
            }));
        }
        Ok(work)
    }

    fn settle(
        &self,
        subscription: usize,
        message: QueuedMessage,
        disposition: Disposition,
        report: &mut DeliveryReport,
    ) -> EventBusResult<()> {
        let mut state = self.lock()?;
        let Some(target) = state.subscriptions.get_mut(subscription) else {
            return Ok(());
        };
        match disposition {
            Disposition::Ack => report.acked += 1,
            Disposition::Drop => report.dropped += 1,
            Disposition::Nak if message.deliveries < target.spec.max_deliver => {
                debug!(
                    subject = %target.spec.subject,
                    attempt = message.deliveries,
                    "message nak'd, scheduling redelivery"
                );
                target.queue.push_back(message);
                report.redelivering += 1;
            }
            Disposition::Nak => {
                warn!(
                    subject = %target.spec.subject,
                    durable = %target.spec.durable_name,
                    deliveries = message.deliveries,
                    "delivery attempts exhausted, dead-lettering message"
                );
                let dead_letter = DeadLetter {
                    subject: target.spec.subject.clone(),
                    durable_name: target.spec.durable_name.clone(),
                    payload: message.payload,
                    deliveries: message.deliveries,
                };
                state.dead_letters.push(dead_letter);
                report.dead_lettered += 1;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<C> EventBus for InMemoryEventBus<C>
where
    C: Clock + Send + Sync,
{
    async fn publish(
        &self,
        subject: &str,
        payload: Vec<u8>,
        dedup_key: Option<&str>,
    ) -> EventBusResult<PublishOutcome> {
        let (mut state, now) = self.lock_pruned()?;
        if let Some(key) = dedup_key {
            if state.seen_keys.contains_key(key) {
                debug!(subject, dedup_key = key, "duplicate publish suppressed");
                return Ok(PublishOutcome::Duplicate);
            }
            state.seen_keys.insert(key.to_owned(), now);
        }

        for subscription in state
            .subscriptions
            .iter_mut()
            .filter(|subscription| subscription.spec.subject == subject)
        {
            subscription.queue.push_back(QueuedMessage {
                payload: payload.clone(),
                deliveries: 0,
            });
        }
        state.retained.push_back(RetainedMessage {
            subject: subject.to_owned(),
            payload,
            published_at: now,
        });
        Ok(PublishOutcome::Published)
    }

    async fn subscribe(
        &self,
        spec: SubscriptionSpec,
        handler: Arc<dyn MessageHandler>,
    ) -> EventBusResult<()> {
        let (mut state, _) = self.lock_pruned()?;
        let already_bound = state.subscriptions.iter().any(|existing| {
            existing.spec.subject == spec.subject && existing.spec.durable_name == spec.durable_name
        });
        if already_bound {
            return Err(EventBusError::DuplicateSubscription {
                subject: spec.subject,
                durable_name: spec.durable_name,
            });
        }

        let queue = state
            .retained
            .iter()
            .filter(|retained| retained.subject == spec.subject)
            .map(|retained| QueuedMessage {
                payload: retained.payload.clone(),
                deliveries: 0,
            })
            .collect();
        state.subscriptions.push(Subscription {
            spec,
            handler,
            queue,
        });
        Ok(())
    }
}
