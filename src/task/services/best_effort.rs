//! Try-log-continue combinator for optional side writes.

use std::fmt::Display;
use std::future::Future;
use tracing::warn;

/// Awaits a fallible side operation, logging and discarding its error.
///
/// Returns the value on success and `None` on failure. The caller carries on
/// either way, so this is only for writes whose loss leaves the primary state
/// consistent (metrics recompute, pending cleanup after relocation, queue
/// persistence).
pub async fn best_effort<T, E, F>(operation: &'static str, future: F) -> Option<T>
where
    F: Future<Output = Result<T, E>>,
    E: Display,
{
    future
        .await
        .inspect_err(|err| warn!(operation, error = %err, "best-effort operation failed"))
        .ok()
}
