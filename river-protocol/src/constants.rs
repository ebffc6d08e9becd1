//! Protocol-level constants

/// Lowest protocol version this implementation will negotiate.
pub const MIN_PROTOCOL_VERSION: u8 = 1;

/// Highest protocol version this implementation will negotiate.
pub const MAX_PROTOCOL_VERSION: u8 = 2;

/// Hard ceiling on a single encoded frame, matching `LimitsConfig::max_frame_bytes`.
pub const MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;

/// Length-prefix width used by the codec, in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;
