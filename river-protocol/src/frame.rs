//! Wire frame definitions
//!
//! Every frame carries the full header described by the data model: unlike a
//! raw byte tunnel, River needs `seq`/`ack` on every frame (including plain
//! data frames) to maintain ordered, deduplicated delivery, so there is no
//! separate lightweight "data frame" fast path at this layer.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// `controlFlags` bit: this frame's `ack` field is meaningful on its own,
/// i.e. it may be a heartbeat with no payload change.
pub const FLAG_ACK: u8 = 0x01;
/// `controlFlags` bit: this frame opens a new stream.
pub const FLAG_STREAM_OPEN: u8 = 0x02;
/// `controlFlags` bit: this frame closes (this side of) a stream.
pub const FLAG_STREAM_CLOSED: u8 = 0x04;

/// All flag bits the codec recognizes. Any other bit set is a protocol
/// violation (`ControlFrameInvalid`).
pub const KNOWN_FLAGS: u8 = FLAG_ACK | FLAG_STREAM_OPEN | FLAG_STREAM_CLOSED;

/// Protocol version negotiated at handshake time.
///
/// v1 has no resumption semantics; v2 adds session resumption. The two are
/// wire-compatible at the frame level — only handshake behavior differs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ProtocolVersion {
    V1,
    V2,
}

impl ProtocolVersion {
    #[must_use]
    pub fn supports_resume(self) -> bool {
        matches!(self, ProtocolVersion::V2)
    }
}

/// `{ type: "HANDSHAKE_REQ", protocolVersion, instanceId }`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HandshakeRequest {
    pub protocol_version: ProtocolVersion,
    pub instance_id: String,
}

/// `{ ok, instanceId?, reason? }` nested inside a handshake response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HandshakeStatus {
    pub ok: bool,
    pub instance_id: Option<String>,
    pub reason: Option<String>,
}

/// `{ type: "HANDSHAKE_RESP", status }`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HandshakeResponse {
    pub status: HandshakeStatus,
}

/// The payload carried by a transport frame.
///
/// A tagged sum rather than a dynamic/untyped map: `App` carries
/// pre-serialized bytes (produced by a per-endpoint encoder standing in for
/// generated codegen), so the transport layer never needs to know the
/// application's wire format once a frame is stamped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum FramePayload {
    HandshakeRequest(HandshakeRequest),
    HandshakeResponse(HandshakeResponse),
    /// `{ type: "CLOSE" }`
    Close,
    /// Application payload, opaque to the transport.
    App(Bytes),
}

/// The unit exchanged on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransportFrame {
    pub id: String,
    pub from: String,
    pub to: String,
    pub seq: u64,
    pub ack: u64,
    pub stream_id: Option<u32>,
    pub service_name: Option<String>,
    pub procedure_name: Option<String>,
    pub control_flags: u8,
    pub payload: FramePayload,
}

impl TransportFrame {
    #[must_use]
    pub fn has_flag(&self, flag: u8) -> bool {
        self.control_flags & flag != 0
    }

    #[must_use]
    pub fn is_stream_open(&self) -> bool {
        self.has_flag(FLAG_STREAM_OPEN)
    }

    #[must_use]
    pub fn is_stream_closed(&self) -> bool {
        self.has_flag(FLAG_STREAM_CLOSED)
    }

    /// A frame bearing both `STREAM_OPEN` and `STREAM_CLOSED` is a
    /// single-frame unary request/response (invariant 3).
    #[must_use]
    pub fn is_unary_frame(&self) -> bool {
        self.is_stream_open() && self.is_stream_closed()
    }

    #[must_use]
    pub fn has_unknown_flags(&self) -> bool {
        self.control_flags & !KNOWN_FLAGS != 0
    }
}
