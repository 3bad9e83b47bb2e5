//! Development-time tracing for debugging formula evaluation.
//!
//! Diagnostics produced by the pipeline itself (`core::types::Diagnostics`)
//! are returned to the caller and are unaffected by `RUST_LOG`. This module
//! only configures stderr tracing; stdout is reserved for the output grid.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing subscriber for development logging.
///
/// Reads `RUST_LOG` env var. Defaults to `warn` if unset.
/// Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=sheetgen=debug cargo run -- list "5 product name ideas"
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
