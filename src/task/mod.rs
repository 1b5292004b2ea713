//! Task lifecycle management.
//!
//! Tasks enter the pending collection when a `task.new` event is ingested,
//! are scored and assigned to workers, and move to the history collection
//! when their pipeline reports an outcome. The module follows hexagonal
//! architecture:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Orchestration services in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
