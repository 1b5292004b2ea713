//! Service wiring.
//!
//! A [`Coordinator`] owns one task store (serving as both the pending and the
//! history collection), the in-memory event bus, the application services
//! and the FIFO queue, and binds the ingestion consumer to the configured
//! subjects. [`Deployment::from_config`] picks the store from
//! `database_url`.

use crate::config::{ConfigError, ServiceConfig};
use crate::queue::{TaskProducer, TaskQueue};
use crate::task::{
    adapters::{
        memory::{DeliveryReport, InMemoryEventBus, InMemoryTaskStore},
        postgres::{PostgresTaskStore, TaskPgPool},
    },
    ports::{EventBusError, EventBusResult, PendingTaskStore, TaskHistoryStore},
    services::{
        EventIngestionService, IngestionConsumer, RepositoryMetricsService, TaskAssignmentService,
    },
};
use diesel::pg::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool, PoolError};
use mockable::DefaultClock;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Errors raised while assembling the services.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The database pool could not be created.
    #[error("failed to create database pool: {0}")]
    Pool(#[from] PoolError),

    /// A durable consumer could not be bound.
    #[error(transparent)]
    Bus(#[from] EventBusError),
}

/// Assembled services sharing one store and one bus.
pub struct Coordinator<S = InMemoryTaskStore>
where
    S: PendingTaskStore + TaskHistoryStore + 'static,
{
    config: ServiceConfig,
    store: Arc<S>,
    bus: Arc<InMemoryEventBus>,
    assignment: TaskAssignmentService<S, DefaultClock>,
    metrics: RepositoryMetricsService<S, S, DefaultClock>,
    queue: Arc<TaskQueue<DefaultClock>>,
    producer: TaskProducer<InMemoryEventBus, DefaultClock>,
}

/// Coordinator over whichever store the configuration selects.
pub enum Deployment {
    /// Tasks live in process memory.
    InMemory(Coordinator<InMemoryTaskStore>),
    /// Tasks live in `PostgreSQL`.
    Postgres(Coordinator<PostgresTaskStore>),
}

impl Deployment {
    /// Starts on `PostgreSQL` when `database_url` is set and on the
    /// in-memory store otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError`] when the configuration is invalid, the
    /// pool cannot be created or a consumer cannot be bound.
    pub async fn from_config(config: ServiceConfig) -> Result<Self, CoordinatorError> {
        config.validate()?;
        match config.database_url.clone() {
            Some(url) => {
                info!("using PostgreSQL task store");
                Ok(Self::Postgres(Coordinator::postgres(config, &url).await?))
            }
            None => {
                info!("using in-memory task store");
                Ok(Self::InMemory(Coordinator::in_memory(config).await?))
            }
        }
    }

    /// Returns the active configuration.
    #[must_use]
    pub const fn config(&self) -> &ServiceConfig {
        match self {
            Self::InMemory(coordinator) => coordinator.config(),
            Self::Postgres(coordinator) => coordinator.config(),
        }
    }

    /// Returns the event bus.
    #[must_use]
    pub const fn bus(&self) -> &Arc<InMemoryEventBus> {
        match self {
            Self::InMemory(coordinator) => coordinator.bus(),
            Self::Postgres(coordinator) => coordinator.bus(),
        }
    }

    /// Delivers bus messages until the backlog drains.
    ///
    /// # Errors
    ///
    /// Returns the bus error when delivery state is unavailable.
    pub async fn pump(&self) -> EventBusResult<DeliveryReport> {
        match self {
            Self::InMemory(coordinator) => coordinator.pump().await,
            Self::Postgres(coordinator) => coordinator.pump().await,
        }
    }
}

impl std::fmt::Debug for Deployment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InMemory(_) => f.write_str("Deployment::InMemory"),
            Self::Postgres(_) => f.write_str("Deployment::Postgres"),
        }
    }
}

impl Coordinator<InMemoryTaskStore> {
    /// Starts the services on an in-memory store.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError`] when the configuration is invalid or a
    /// consumer cannot be bound.
    pub async fn in_memory(config: ServiceConfig) -> Result<Self, CoordinatorError> {
        Self::start(config, Arc::new(InMemoryTaskStore::new())).await
    }
}

impl Coordinator<PostgresTaskStore> {
    /// Starts the services on a `PostgreSQL` store reached through `url`.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError`] when the pool cannot be created, the
    /// configuration is invalid or a consumer cannot be bound.
    pub async fn postgres(config: ServiceConfig, url: &str) -> Result<Self, CoordinatorError> {
        let pool: TaskPgPool = Pool::builder().build(ConnectionManager::<PgConnection>::new(url))?;
        Self::start(config, Arc::new(PostgresTaskStore::new(pool))).await
    }
}

impl<S> Coordinator<S>
where
    S: PendingTaskStore + TaskHistoryStore + 'static,
{
    /// Validates `config`, builds the services around `store` and binds the
    /// ingestion consumer.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError`] when the configuration is invalid or a
    /// consumer cannot be bound.
    pub async fn start(config: ServiceConfig, store: Arc<S>) -> Result<Self, CoordinatorError> {
        config.validate()?;
        let clock = Arc::new(DefaultClock);
        let bus = Arc::new(InMemoryEventBus::with_retention(
            Arc::clone(&clock),
            config.bus.retention(),
        ));

        let metrics =
            RepositoryMetricsService::new(Arc::clone(&store), Arc::clone(&store), Arc::clone(&clock))
                .with_runtime_window(config.metrics.runtime_window);
        let ingestion =
            EventIngestionService::new(Arc::clone(&store), Arc::clone(&store), Arc::clone(&clock))
                .with_metrics(metrics.clone());
        Arc::new(IngestionConsumer::new(ingestion, config.bus.clone()))
            .start(bus.as_ref())
            .await?;

        let assignment = TaskAssignmentService::new(Arc::clone(&store), Arc::clone(&clock))
            .with_max_attempts(config.assignment.max_attempts);
        let queue = Arc::new(TaskQueue::new(clock));
        let producer = TaskProducer::new(
            Arc::clone(&bus),
            Arc::clone(&queue),
            config.bus.task_new_subject.clone(),
        );

        info!(stream = %config.bus.stream, "services started");
        Ok(Self {
            config,
            store,
            bus,
            assignment,
            metrics,
            queue,
            producer,
        })
    }

    /// Returns the active configuration.
    #[must_use]
    pub const fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Returns the shared task store.
    #[must_use]
    pub const fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Returns the event bus.
    #[must_use]
    pub const fn bus(&self) -> &Arc<InMemoryEventBus> {
        &self.bus
    }

    /// Returns the assignment service.
    #[must_use]
    pub const fn assignment(&self) -> &TaskAssignmentService<S, DefaultClock> {
        &self.assignment
    }

    /// Returns the metrics service.
    #[must_use]
    pub const fn metrics(&self) -> &RepositoryMetricsService<S, S, DefaultClock> {
        &self.metrics
    }

    /// Returns the FIFO queue.
    #[must_use]
    pub const fn queue(&self) -> &Arc<TaskQueue<DefaultClock>> {
        &self.queue
    }

    /// Returns the queue producer.
    #[must_use]
    pub const fn producer(&self) -> &TaskProducer<InMemoryEventBus, DefaultClock> {
        &self.producer
    }

    /// Delivers bus messages until the backlog drains. The round limit lets
    /// every message exhaust its delivery attempts.
    ///
    /// # Errors
    ///
    /// Returns the bus error when delivery state is unavailable.
    pub async fn pump(&self) -> EventBusResult<DeliveryReport> {
        let rounds = usize::try_from(self.config.bus.max_deliver)
            .unwrap_or(usize::MAX)
            .saturating_add(1);
        self.bus.run_until_idle(rounds).await
    }
}
