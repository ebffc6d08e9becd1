//! Logging initialization for River.
//!
//! Trimmed from `ferrotunnel-observability`: metrics, OpenTelemetry/OTLP
//! export, and the dashboard are teacher features with no River counterpart
//! (see DESIGN.md) and are dropped. What remains is the `tracing-subscriber`
//! `EnvFilter` setup `ferrotunnel-observability::init_minimal_logging` used
//! for its own latency-sensitive deployments — here it's the only mode.

pub mod tracing;

pub use tracing::init_logging;
