//! Lifecycle events exchanged over the message bus.

use super::{RepositoryName, TaskId};
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Event announcing a newly created task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskNewEvent {
    /// Producer-assigned task identifier.
    pub task_id: TaskId,
    /// Issue the task was derived from.
    #[serde(default)]
    pub issue_id: String,
    /// Owning repository.
    pub repository: RepositoryName,
    /// Path of the task definition file.
    #[serde(default)]
    pub task_file_path: String,
    /// Size hint of the work unit; zero or negative means unknown.
    #[serde(default)]
    pub size_bytes: i64,
    /// Producer creation timestamp.
    #[serde(default, deserialize_with = "deserialize_wire_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Result reported by a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineOutcome {
    /// The pipeline succeeded.
    Success,
    /// The pipeline failed. Any unrecognised status is read as a failure.
    #[serde(other)]
    Failure,
}

/// Event reporting that a task's pipeline has finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineCompletedEvent {
    /// Task the pipeline ran for.
    pub task_id: TaskId,
    /// Owning repository.
    pub repository: RepositoryName,
    /// Measured pipeline runtime.
    #[serde(default)]
    pub pipeline_runtime_ms: i64,
    /// Pipeline result.
    pub status: PipelineOutcome,
    /// Completion timestamp.
    #[serde(default, deserialize_with = "deserialize_wire_timestamp")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Failure detail for unsuccessful runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Reads an optional timestamp, mapping the `0001-01-01T00:00:00Z` zero value
/// some producers emit to `None`.
fn deserialize_wire_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<DateTime<Utc>>::deserialize(deserializer)?;
    Ok(value.filter(|timestamp| timestamp.year() > 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    fn zero_timestamp_reads_as_unknown() {
        let event: TaskNewEvent = serde_json::from_value(json!({
            "task_id": "t-1",
            "issue_id": "42",
            "repository": "acme/widgets",
            "task_file_path": "tasks/t-1.md",
            "size_bytes": 10,
            "created_at": "0001-01-01T00:00:00Z"
        }))
        .expect("event should decode");

        assert_eq!(event.created_at, None);
    }

    #[rstest]
    fn missing_optional_fields_use_defaults() {
        let event: TaskNewEvent = serde_json::from_value(json!({
            "task_id": "t-2",
            "repository": "acme/widgets"
        }))
        .expect("event should decode");

        assert_eq!(event.size_bytes, 0);
        assert_eq!(event.created_at, None);
        assert!(event.issue_id.is_empty());
    }

    #[rstest]
    fn empty_task_id_is_rejected() {
        let result = serde_json::from_value::<TaskNewEvent>(json!({
            "task_id": "  ",
            "repository": "acme/widgets"
        }));

        assert!(result.is_err());
    }

    #[rstest]
    #[case("success", PipelineOutcome::Success)]
    #[case("failure", PipelineOutcome::Failure)]
    #[case("timeout", PipelineOutcome::Failure)]
    fn pipeline_status_decodes(#[case] raw: &str, #[case] expected: PipelineOutcome) {
        let event: PipelineCompletedEvent = serde_json::from_value(json!({
            "task_id": "t-3",
            "repository": "acme/widgets",
            "pipeline_runtime_ms": 1200,
            "status": raw,
            "completed_at": "2026-01-02T03:04:05Z"
        }))
        .expect("event should decode");

        assert_eq!(event.status, expected);
        assert!(event.completed_at.is_some());
    }
}
