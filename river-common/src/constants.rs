//! Default ports and values shared by the reference harness client/server.

/// Default control-plane port when `PORT` is unset.
pub const DEFAULT_PORT: u16 = 7836;

/// Default heartbeat interval in milliseconds, per the spec's External Interfaces.
pub const DEFAULT_HEARTBEAT_MS: u64 = 500;

/// Default number of missed heartbeats before a connection is declared dead.
pub const DEFAULT_HEARTBEATS_UNTIL_DEAD: u32 = 2;

/// Default session disconnect grace window in milliseconds.
pub const DEFAULT_SESSION_DISCONNECT_GRACE_MS: u64 = 3000;
