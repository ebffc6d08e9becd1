//! Configuration types for River, populated from environment variables.
//!
//! These are the knobs for the reference client/server harnesses described
//! in the external interfaces of the spec: heartbeat cadence, liveness
//! threshold, and the disconnect grace window. None of these are part of the
//! wire protocol itself.

use crate::constants::{
    DEFAULT_HEARTBEAT_MS, DEFAULT_HEARTBEATS_UNTIL_DEAD, DEFAULT_PORT,
    DEFAULT_SESSION_DISCONNECT_GRACE_MS,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Resource limits configuration, carried over from the frame/session layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum frame size in bytes (default: 16MB)
    pub max_frame_bytes: u64,
    /// Maximum concurrent sessions per server
    pub max_sessions: usize,
    /// Maximum streams per session
    pub max_streams_per_session: usize,
    /// Maximum in-flight frames per session
    pub max_inflight_frames: usize,
    /// Queue capacity for streaming-shaped streams (subscription/stream)
    pub streaming_queue_capacity: usize,
    /// Queue capacity for non-streaming-shaped streams (unary/upload response slot)
    pub unary_queue_capacity: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: 16 * 1024 * 1024,
            max_sessions: 1000,
            max_streams_per_session: 100,
            max_inflight_frames: 100,
            streaming_queue_capacity: 1024,
            unary_queue_capacity: 1,
        }
    }
}

/// Environment-driven configuration for the reference harness client/server.
///
/// Field names and defaults follow the spec's External Interfaces section
/// exactly: `HEARTBEAT_MS` (default 500), `HEARTBEATS_UNTIL_DEAD` (default 2),
/// `SESSION_DISCONNECT_GRACE_MS` (default 3000), plus `PORT`,
/// `CLIENT_TRANSPORT_ID`, `SERVER_TRANSPORT_ID`, `RIVER_SERVER`.
#[derive(Debug, Clone)]
pub struct RiverConfig {
    pub port: u16,
    pub client_transport_id: Option<String>,
    pub server_transport_id: Option<String>,
    pub heartbeat_interval: Duration,
    pub heartbeats_until_dead: u32,
    pub session_disconnect_grace: Duration,
    pub river_server: Option<String>,
    pub limits: LimitsConfig,
}

impl Default for RiverConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            client_transport_id: None,
            server_transport_id: None,
            heartbeat_interval: Duration::from_millis(DEFAULT_HEARTBEAT_MS),
            heartbeats_until_dead: DEFAULT_HEARTBEATS_UNTIL_DEAD,
            session_disconnect_grace: Duration::from_millis(DEFAULT_SESSION_DISCONNECT_GRACE_MS),
            river_server: None,
            limits: LimitsConfig::default(),
        }
    }
}

impl RiverConfig {
    /// Build a config from environment variables, falling back to spec defaults
    /// for anything unset or unparsable.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.port),
            client_transport_id: std::env::var("CLIENT_TRANSPORT_ID").ok(),
            server_transport_id: std::env::var("SERVER_TRANSPORT_ID").ok(),
            heartbeat_interval: std::env::var("HEARTBEAT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map_or(defaults.heartbeat_interval, Duration::from_millis),
            heartbeats_until_dead: std::env::var("HEARTBEATS_UNTIL_DEAD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.heartbeats_until_dead),
            session_disconnect_grace: std::env::var("SESSION_DISCONNECT_GRACE_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map_or(defaults.session_disconnect_grace, Duration::from_millis),
            river_server: std::env::var("RIVER_SERVER").ok(),
            limits: LimitsConfig::default(),
        }
    }
}
