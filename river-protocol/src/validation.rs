//! Frame validation for security hardening.
//!
//! River has no auth tokens or capability lists at the transport layer, so
//! this is narrower than a generic tunnel's validation: the only things
//! worth rejecting up front are oversized frames and malformed identifiers.

use crate::frame::{FramePayload, TransportFrame};

/// Validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("frame too large: {size} bytes exceeds limit of {limit} bytes")]
    FrameTooLarge { size: u64, limit: u64 },

    #[error("payload too large: {size} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("instance id too long: {len} bytes exceeds limit of {limit} bytes")]
    InstanceIdTooLong { len: usize, limit: usize },
}

/// Validation limits.
#[derive(Debug, Clone)]
pub struct ValidationLimits {
    pub max_frame_bytes: u64,
    pub max_payload_bytes: usize,
    pub max_instance_id_len: usize,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_frame_bytes: 16 * 1024 * 1024,
            max_payload_bytes: 16 * 1024 * 1024,
            max_instance_id_len: 256,
        }
    }
}

/// Validate a decoded frame against limits.
///
/// This is an extra layer of defense on top of the codec's own max-frame-size
/// check: the codec bounds the wire bytes, this bounds the semantic content
/// once it has been decoded (e.g. the size of an `App` payload specifically,
/// not the frame as a whole, which also carries header overhead).
pub fn validate_frame(
    frame: &TransportFrame,
    limits: &ValidationLimits,
) -> Result<(), ValidationError> {
    match &frame.payload {
        FramePayload::HandshakeRequest(req) => {
            if req.instance_id.len() > limits.max_instance_id_len {
                return Err(ValidationError::InstanceIdTooLong {
                    len: req.instance_id.len(),
                    limit: limits.max_instance_id_len,
                });
            }
        }
        FramePayload::App(data) => {
            if data.len() > limits.max_payload_bytes {
                return Err(ValidationError::PayloadTooLarge {
                    size: data.len(),
                    limit: limits.max_payload_bytes,
                });
            }
        }
        FramePayload::HandshakeResponse(_) | FramePayload::Close => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{FLAG_STREAM_OPEN, HandshakeRequest, ProtocolVersion};
    use bytes::Bytes;

    fn frame_with(payload: FramePayload) -> TransportFrame {
        TransportFrame {
            id: "f1".into(),
            from: "client-1".into(),
            to: "server-1".into(),
            seq: 0,
            ack: 0,
            stream_id: Some(1),
            service_name: None,
            procedure_name: None,
            control_flags: FLAG_STREAM_OPEN,
            payload,
        }
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let limits = ValidationLimits {
            max_payload_bytes: 4,
            ..ValidationLimits::default()
        };
        let frame = frame_with(FramePayload::App(Bytes::from_static(b"too big")));
        assert!(matches!(
            validate_frame(&frame, &limits),
            Err(ValidationError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn test_instance_id_too_long_rejected() {
        let limits = ValidationLimits {
            max_instance_id_len: 4,
            ..ValidationLimits::default()
        };
        let frame = frame_with(FramePayload::HandshakeRequest(HandshakeRequest {
            protocol_version: ProtocolVersion::V2,
            instance_id: "way-too-long".into(),
        }));
        assert!(matches!(
            validate_frame(&frame, &limits),
            Err(ValidationError::InstanceIdTooLong { .. })
        ));
    }

    #[test]
    fn test_well_formed_frame_passes() {
        let limits = ValidationLimits::default();
        let frame = frame_with(FramePayload::App(Bytes::from_static(b"ok")));
        assert!(validate_frame(&frame, &limits).is_ok());
    }
}
