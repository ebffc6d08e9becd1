//! `tracing-subscriber` initialization.

use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Install a global `tracing` subscriber that writes formatted events to
/// stdout, filtered by `RUST_LOG` (falling back to `info`).
///
/// Call once, at process start. Grounded in
/// `ferrotunnel_observability::init_minimal_logging`.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}
