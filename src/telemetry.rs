//! Tracing subscriber initialisation.

use std::io::IsTerminal;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter applied when neither an explicit directive nor `RUST_LOG` is set.
pub const DEFAULT_FILTER: &str = "info";

/// Builds the filter from an explicit directive, then `RUST_LOG`, then
/// [`DEFAULT_FILTER`]. Unparseable directives fall through to the next
/// source.
#[must_use]
pub fn resolve_filter(directive: Option<&str>) -> EnvFilter {
    directive
        .and_then(|value| EnvFilter::try_new(value).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}

/// Installs a console subscriber writing to standard error.
///
/// Returns `false` when a global subscriber was already installed, in which
/// case the existing one keeps running.
#[must_use = "repeat initialisation is reported, not raised"]
pub fn init_tracing(directive: Option<&str>) -> bool {
    let console_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr)
        .with_filter(resolve_filter(directive));

    let installed = tracing_subscriber::registry()
        .with(console_layer)
        .try_init()
        .is_ok();
    if installed {
        tracing::debug!(filter = directive, "tracing initialised");
    }
    installed
}
