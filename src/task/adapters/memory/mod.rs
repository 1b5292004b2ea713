//! In-memory adapters for the task store and event bus.
//!
//! Used for tests and for running without external infrastructure.

mod bus;
mod store;

pub use bus::{DEFAULT_RETENTION, DeadLetter, DeliveryReport, InMemoryEventBus};
pub use store::InMemoryTaskStore;
