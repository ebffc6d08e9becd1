//! Common utilities and types for River

pub mod config;
pub mod constants;
pub mod error;

pub use config::{LimitsConfig, RiverConfig};
pub use constants::{
    DEFAULT_HEARTBEAT_MS, DEFAULT_HEARTBEATS_UNTIL_DEAD, DEFAULT_PORT,
    DEFAULT_SESSION_DISCONNECT_GRACE_MS,
};
pub use error::{AppError, Result, RiverError};
