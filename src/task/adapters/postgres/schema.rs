//! Diesel schema for the pending and history task collections.

diesel::table! {
    /// In-flight task records, one row per task identifier.
    pending_tasks (task_id) {
        /// Producer-assigned task identifier.
        #[max_length = 255]
        task_id -> Varchar,
        /// Issue the task was derived from.
        issue_id -> Varchar,
        /// Owning repository.
        repository -> Varchar,
        /// Task definition file path.
        task_file_path -> Varchar,
        /// Producer creation timestamp.
        created_at -> Nullable<Timestamptz>,
        /// Cached last success for the repository.
        last_success_at -> Nullable<Timestamptz>,
        /// Cached average runtime for the repository.
        avg_runtime_ms -> Int8,
        /// Cached active task count for the repository.
        pending_tasks_count -> Int8,
        /// Size hint of the work unit.
        size_bytes -> Int8,
        /// Measured pipeline runtime.
        pipeline_runtime_ms -> Int8,
        /// Assignment timestamp.
        assigned_at -> Nullable<Timestamptz>,
        /// Completion timestamp.
        completed_at -> Nullable<Timestamptz>,
        /// Lifecycle status.
        #[max_length = 50]
        status -> Varchar,
        /// Failure message.
        error_message -> Nullable<Text>,
        /// Cancellation reason.
        cancel_reason -> Nullable<Text>,
    }
}

diesel::table! {
    /// Finalized task records, one row per task identifier.
    task_history (task_id) {
        /// Producer-assigned task identifier.
        #[max_length = 255]
        task_id -> Varchar,
        /// Issue the task was derived from.
        issue_id -> Varchar,
        /// Owning repository.
        repository -> Varchar,
        /// Task definition file path.
        task_file_path -> Varchar,
        /// Producer creation timestamp.
        created_at -> Nullable<Timestamptz>,
        /// Cached last success for the repository at completion time.
        last_success_at -> Nullable<Timestamptz>,
        /// Cached average runtime at completion time.
        avg_runtime_ms -> Int8,
        /// Cached active task count at completion time.
        pending_tasks_count -> Int8,
        /// Size hint of the work unit.
        size_bytes -> Int8,
        /// Measured pipeline runtime.
        pipeline_runtime_ms -> Int8,
        /// Assignment timestamp.
        assigned_at -> Nullable<Timestamptz>,
        /// Completion timestamp.
        completed_at -> Nullable<Timestamptz>,
        /// Terminal status.
        #[max_length = 50]
        status -> Varchar,
        /// Failure message.
        error_message -> Nullable<Text>,
        /// Cancellation reason.
        cancel_reason -> Nullable<Text>,
    }
}
