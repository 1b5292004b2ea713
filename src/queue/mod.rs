//! In-memory FIFO task queue.
//!
//! The queue is the transport-bridging variant used when no durable store is
//! available: a single reader/writer lock guards the task list and the
//! "current task" slot, and an optional persistence collaborator receives
//! best-effort copies of every write. In-memory state is always the source of
//! truth; persistence failures are logged and never surfaced.

mod entry;
mod error;
mod fifo;
mod persistence;
mod producer;

pub use entry::{NewQueuedTask, QueuedTask};
pub use error::{QueueError, QueueResult};
pub use fifo::TaskQueue;
pub use persistence::{InMemoryQueuePersistence, QueuePersistence};
pub use producer::TaskProducer;

#[cfg(test)]
pub use persistence::MockQueuePersistence;
