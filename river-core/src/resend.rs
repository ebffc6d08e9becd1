//! Outbound resend buffer.
//!
//! Holds frames sent but not yet acknowledged by the peer, so a reconnect
//! can replay them (spec.md §4.3). Invariant 5: the buffer contains exactly
//! those frames with `seq >= peer_ack`; anything older is pruned as soon as
//! a newer `ack` is observed from the peer.

use river_protocol::frame::TransportFrame;
use std::collections::VecDeque;

/// FIFO buffer of unacknowledged outbound frames, ordered by `seq`.
#[derive(Debug, Default)]
pub struct ResendBuffer {
    frames: VecDeque<TransportFrame>,
}

impl ResendBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a freshly-stamped outbound frame.
    pub fn push(&mut self, frame: TransportFrame) {
        self.frames.push_back(frame);
    }

    /// Drop every frame with `seq < peer_ack` (invariant 5). Called whenever
    /// an inbound frame reports a new `ack` from the peer.
    pub fn prune_acked(&mut self, peer_ack: u64) {
        while let Some(front) = self.frames.front() {
            if front.seq < peer_ack {
                self.frames.pop_front();
            } else {
                break;
            }
        }
    }

    /// All buffered frames still owed to the peer, in `seq` order — used to
    /// replay after a reconnect.
    pub fn iter(&self) -> impl Iterator<Item = &TransportFrame> {
        self.frames.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frames with `seq >= from_ack`, for resuming from the ack carried on a
    /// handshake response (spec.md §4.3: "all frames with `seq >= peer.ack`
    /// from the handshake response, if supplied; else all buffered frames").
    pub fn frames_from(&self, from_ack: u64) -> impl Iterator<Item = &TransportFrame> {
        self.frames.iter().filter(move |f| f.seq >= from_ack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use river_protocol::frame::FramePayload;

    fn frame(seq: u64) -> TransportFrame {
        TransportFrame {
            id: format!("f{seq}"),
            from: "a".into(),
            to: "b".into(),
            seq,
            ack: 0,
            stream_id: Some(1),
            service_name: None,
            procedure_name: None,
            control_flags: 0,
            payload: FramePayload::Close,
        }
    }

    #[test]
    fn prune_drops_only_acked_frames() {
        let mut buf = ResendBuffer::new();
        buf.push(frame(0));
        buf.push(frame(1));
        buf.push(frame(2));

        buf.prune_acked(2);
        assert_eq!(buf.len(), 1);
        assert_eq!(buf.iter().next().unwrap().seq, 2);
    }

    #[test]
    fn frames_from_filters_by_ack() {
        let mut buf = ResendBuffer::new();
        for s in 0..5 {
            buf.push(frame(s));
        }
        let replay: Vec<u64> = buf.frames_from(3).map(|f| f.seq).collect();
        assert_eq!(replay, vec![3, 4]);
    }
}
