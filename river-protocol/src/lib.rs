//! River wire protocol
//!
//! This crate defines the binary protocol used for communication between
//! River clients and servers: the frame shape, its length-delimited codec,
//! and frame-level validation.

pub mod codec;
pub mod constants;
pub mod frame;
pub mod validation;

pub use codec::{FrameCodec, FrameCodecError};
pub use frame::{
    FLAG_ACK, FLAG_STREAM_CLOSED, FLAG_STREAM_OPEN, FramePayload, HandshakeRequest,
    HandshakeResponse, HandshakeStatus, ProtocolVersion, TransportFrame,
};
pub use validation::{ValidationError, ValidationLimits, validate_frame};
