//! Taskrank: priority-scored task lifecycle service.
//!
//! This crate ingests task announcements and pipeline outcomes from a durable
//! event bus, keeps every task in a pending or history collection, scores
//! pending work so the most urgent task is handed out first, and maintains
//! per-repository statistics used by the scoring engine.
//!
//! # Architecture
//!
//! Taskrank follows hexagonal architecture principles:
//!
//! - **Domain**: Pure business logic with no infrastructure dependencies
//! - **Ports**: Abstract trait interfaces for the store and the bus
//! - **Adapters**: Concrete implementations of ports (in-memory, `PostgreSQL`)
//! - **Services**: Orchestration of ingestion, assignment and reporting
//!
//! # Modules
//!
//! - [`task`]: Task lifecycle, scoring, ingestion and assignment
//! - [`queue`]: In-memory FIFO queue and bus producer
//! - [`config`]: Service configuration
//! - [`telemetry`]: Tracing setup
//! - [`coordinator`]: Service wiring

pub mod config;
pub mod coordinator;
pub mod queue;
pub mod task;
pub mod telemetry;
