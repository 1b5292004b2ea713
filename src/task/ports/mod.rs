//! Port contracts for the task lifecycle.
//!
//! Ports define infrastructure-agnostic interfaces for the persistence and
//! message bus collaborators used by task services.

pub mod bus;
pub mod store;

pub use bus::{
    Delivery, Disposition, EventBus, EventBusError, EventBusResult, MessageHandler,
    PublishOutcome, SubscriptionSpec,
};
pub use store::{
    ConditionalUpdate, HistoryFilter, PendingFilter, PendingTaskStore, TaskHistoryStore,
    TaskStoreError, TaskStoreResult,
};
