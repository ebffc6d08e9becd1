//! Codec for encoding and decoding `TransportFrame`s.
//!
//! Length-delimited framing for maximum performance:
//! - 4-byte length prefix (u32 big-endian), covering the bincode payload only
//! - `bincode` payload of the full `TransportFrame`
//!
//! Every frame carries `seq`/`ack` so, unlike a raw byte tunnel, there is no
//! separate lightweight fast path for application data: all frames go
//! through the same bincode envelope.

use crate::constants::MAX_FRAME_SIZE;
use crate::frame::TransportFrame;
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

const LENGTH_PREFIX_SIZE: usize = 4;

/// Errors raised while framing bytes on or off the wire.
#[derive(Debug, thiserror::Error)]
pub enum FrameCodecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("encode error: {0}")]
    Encode(String),
    #[error("frame too large: {size} bytes exceeds limit of {limit} bytes")]
    FrameTooLarge { size: usize, limit: usize },
    #[error("control frame carries unknown flag bits: {0:#x}")]
    ControlFrameInvalid(u8),
}

/// River wire codec using length-delimited bincode framing.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self {
            max_frame_size: MAX_FRAME_SIZE as usize,
        }
    }
}

impl FrameCodec {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    #[inline]
    #[must_use]
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl Decoder for FrameCodec {
    type Item = TransportFrame;
    type Error = FrameCodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < LENGTH_PREFIX_SIZE {
            src.reserve(LENGTH_PREFIX_SIZE - src.len());
            return Ok(None);
        }

        let length = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;

        if length == 0 {
            return Err(FrameCodecError::Decode(
                "frame length must be at least 1 byte".into(),
            ));
        }
        if length > self.max_frame_size {
            return Err(FrameCodecError::FrameTooLarge {
                size: length,
                limit: self.max_frame_size,
            });
        }

        let total_size = LENGTH_PREFIX_SIZE + length;
        if src.len() < total_size {
            src.reserve(total_size - src.len());
            return Ok(None);
        }

        let mut frame_bytes = src.split_to(total_size).freeze();
        frame_bytes.advance(LENGTH_PREFIX_SIZE);

        let config = bincode_next::config::standard().with_limit::<{ MAX_FRAME_SIZE as usize }>();
        let (frame, _): (TransportFrame, usize) =
            bincode_next::serde::decode_from_slice(frame_bytes.as_ref(), config)
                .map_err(|e| FrameCodecError::Decode(e.to_string()))?;

        if frame.has_unknown_flags() {
            return Err(FrameCodecError::ControlFrameInvalid(frame.control_flags));
        }

        Ok(Some(frame))
    }
}

impl Encoder<TransportFrame> for FrameCodec {
    type Error = FrameCodecError;

    fn encode(&mut self, frame: TransportFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if frame.has_unknown_flags() {
            return Err(FrameCodecError::ControlFrameInvalid(frame.control_flags));
        }

        let config = bincode_next::config::standard();
        let serialized = bincode_next::serde::encode_to_vec(&frame, config)
            .map_err(|e| FrameCodecError::Encode(e.to_string()))?;

        if serialized.len() > self.max_frame_size {
            return Err(FrameCodecError::FrameTooLarge {
                size: serialized.len(),
                limit: self.max_frame_size,
            });
        }

        dst.reserve(LENGTH_PREFIX_SIZE + serialized.len());
        dst.put_u32(serialized.len() as u32);
        dst.extend_from_slice(&serialized);
        Ok(())
    }
}
