//! Unit tests for the task lifecycle.

mod domain_tests;
mod metrics_tests;
mod support;
