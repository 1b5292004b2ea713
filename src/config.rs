//! Service configuration.
//!
//! Values come from built-in defaults, then an optional TOML file, then
//! `TASKRANK__*` environment variables, with nested keys separated by a
//! double underscore (`TASKRANK__BUS__MAX_DELIVER=5`).

use ::config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "TASKRANK";

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A source could not be read or deserialized.
    #[error("failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    /// A value is outside its permitted range.
    #[error("invalid configuration value for {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending key.
        field: &'static str,
        /// Why the value was rejected.
        reason: &'static str,
    },
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Event bus stream and consumer settings.
    pub bus: BusConfig,
    /// Task assignment settings.
    pub assignment: AssignmentConfig,
    /// Repository metrics settings.
    pub metrics: MetricsConfig,
    /// `PostgreSQL` connection string; the in-memory store is used when
    /// absent.
    pub database_url: Option<String>,
    /// Tracing filter directive; `RUST_LOG` applies when absent.
    pub log_filter: Option<String>,
}

/// Durable stream and consumer settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Stream holding both subjects.
    pub stream: String,
    /// Subject carrying new tasks.
    pub task_new_subject: String,
    /// Subject carrying pipeline outcomes.
    pub pipeline_completed_subject: String,
    /// Durable consumer for new tasks.
    pub task_new_durable: String,
    /// Durable consumer for pipeline outcomes.
    pub pipeline_completed_durable: String,
    /// Delivery attempts before a message is dead-lettered.
    pub max_deliver: u32,
    /// Seconds the bus waits for a settlement before redelivering.
    pub ack_wait_secs: u64,
    /// Seconds messages are retained on the stream.
    pub retention_secs: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            stream: "AGENT".to_owned(),
            task_new_subject: "agent.task.new".to_owned(),
            pipeline_completed_subject: "agent.pipeline.completed".to_owned(),
            task_new_durable: "agent-intel-task-new".to_owned(),
            pipeline_completed_durable: "agent-intel-pipeline-completed".to_owned(),
            max_deliver: 3,
            ack_wait_secs: 30,
            retention_secs: 7 * 24 * 60 * 60,
        }
    }
}

impl BusConfig {
    /// Returns the ack-wait as a [`Duration`].
    #[must_use]
    pub const fn ack_wait(&self) -> Duration {
        Duration::from_secs(self.ack_wait_secs)
    }

    /// Returns the stream retention as a [`Duration`].
    #[must_use]
    pub const fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

/// Task assignment settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AssignmentConfig {
    /// Rescans allowed after losing a conditional write before giving up.
    pub max_attempts: u32,
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        Self { max_attempts: 5 }
    }
}

/// Repository metrics settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Completed tasks averaged into `avg_runtime_ms`.
    pub runtime_window: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { runtime_window: 10 }
    }
}

impl ServiceConfig {
    /// Loads configuration from an optional TOML file and the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Load`] when a source is malformed and
    /// [`ConfigError::Invalid`] when a value fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(file) = path {
            builder = builder.add_source(File::from(file).format(FileFormat::Toml));
        }
        let loaded: Self = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Parses configuration from TOML text, applying defaults for missing
    /// keys.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Load`] when the text is malformed and
    /// [`ConfigError::Invalid`] when a value fails validation.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let loaded: Self = Config::builder()
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Checks values the services cannot operate with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field, reason| Err(ConfigError::Invalid { field, reason });
        if self.bus.task_new_subject.trim().is_empty() {
            return invalid("bus.task_new_subject", "must not be empty");
        }
        if self.bus.pipeline_completed_subject.trim().is_empty() {
            return invalid("bus.pipeline_completed_subject", "must not be empty");
        }
        if self.bus.task_new_durable.trim().is_empty()
            || self.bus.pipeline_completed_durable.trim().is_empty()
        {
            return invalid("bus.durable", "durable names must not be empty");
        }
        if self.bus.max_deliver == 0 {
            return invalid("bus.max_deliver", "must be at least 1");
        }
        if self.assignment.max_attempts == 0 {
            return invalid("assignment.max_attempts", "must be at least 1");
        }
        if self.bus.retention_secs == 0 {
            return invalid("bus.retention_secs", "must be at least 1");
        }
        if self.metrics.runtime_window == 0 {
            return invalid("metrics.runtime_window", "must be at least 1");
        }
        if self
            .database_url
            .as_deref()
            .is_some_and(|url| url.trim().is_empty())
        {
            return invalid("database_url", "must not be blank when set");
        }
        Ok(())
    }
}
