//! Stream registry: maps `streamId` to the per-stream inbound queue.
//!
//! Grounded in `ferrotunnel-core::stream::multiplexer::Multiplexer`'s
//! `DashMap<streamId, Sender>` pattern, adapted to pure per-session
//! ownership: a session runs as a single task (see the crate-level
//! concurrency notes), so the registry is an ordinary `HashMap` mutated only
//! by that task, with no shared-map locking needed.

use crate::resource_limits::{StreamLimits, StreamPermit};
use bytes::Bytes;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::debug;

/// One item delivered to a stream's inbound queue.
#[derive(Debug, Clone)]
pub enum StreamItem {
    /// An application payload frame, still serialized (the dispatcher decodes it).
    Payload(Bytes),
    /// End-of-stream marker: the peer sent `STREAM_CLOSED`. Always the last
    /// item observed on a queue (spec.md §5 ordering guarantee 3).
    Closed,
    /// End-of-stream marker from a session tear-down rather than a peer
    /// `STREAM_CLOSED` (spec.md §4.3/§7: grace window elapsed, all in-flight
    /// streams fail with `UNEXPECTED_DISCONNECT`). Distinguished from
    /// `Closed` so dispatchers can surface the right error.
    Disconnected,
}

/// Queue capacity for a stream, fixed at open time by its RPC shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamCapacity {
    /// Single-response shapes (unary, subscription request, upload/stream response slot).
    Unary,
    /// Multi-item shapes (subscription responses, upload/stream data frames).
    Streaming,
}

impl StreamCapacity {
    #[must_use]
    pub fn queue_depth(self) -> usize {
        match self {
            StreamCapacity::Unary => 1,
            StreamCapacity::Streaming => 1024,
        }
    }
}

/// Errors from registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("stream {0} already open")]
    AlreadyOpen(u32),
    #[error("per-session stream limit reached")]
    LimitExceeded,
}

/// Per-session map from `streamId` to its inbound queue sender, plus the
/// admission permit (if any) that was acquired to open it.
#[derive(Debug, Default)]
pub struct StreamRegistry {
    streams: HashMap<u32, mpsc::Sender<StreamItem>>,
    permits: HashMap<u32, StreamPermit>,
    limits: Option<StreamLimits>,
}

impl StreamRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry that enforces `limits`' cap on concurrently open streams
    /// (spec.md §5 resource model: per-session admission, not just
    /// per-server). Used server-side; client sessions use [`StreamRegistry::new`]
    /// uncapped, since `ServerResourceLimits::max_streams_per_session` has no
    /// client-side counterpart.
    #[must_use]
    pub fn with_limits(limits: StreamLimits) -> Self {
        Self {
            streams: HashMap::new(),
            permits: HashMap::new(),
            limits: Some(limits),
        }
    }

    /// Create a new stream entry and return the receiving half of its queue.
    /// Fails if `stream_id` is already registered (invariant 4: a `streamId`
    /// may not be reused until both sides have observed `STREAM_CLOSED`), or
    /// if opening it would exceed this registry's stream limit.
    pub fn open(
        &mut self,
        stream_id: u32,
        capacity: StreamCapacity,
    ) -> Result<mpsc::Receiver<StreamItem>, RegistryError> {
        if self.streams.contains_key(&stream_id) {
            return Err(RegistryError::AlreadyOpen(stream_id));
        }
        let permit = match &self.limits {
            Some(limits) => Some(
                limits
                    .try_acquire_stream()
                    .map_err(|_| RegistryError::LimitExceeded)?,
            ),
            None => None,
        };
        let (tx, rx) = mpsc::channel(capacity.queue_depth());
        self.streams.insert(stream_id, tx);
        if let Some(permit) = permit {
            self.permits.insert(stream_id, permit);
        }
        Ok(rx)
    }

    /// Push a payload onto `stream_id`'s queue. Awaiting this call is the
    /// session's backpressure mechanism: a full queue suspends the receive
    /// loop until the stream consumer drains it.
    ///
    /// If no entry exists, the frame is logged and dropped: the stream was
    /// already closed locally (spec.md §4.4).
    pub async fn deliver(&self, stream_id: u32, payload: Bytes) {
        if let Some(tx) = self.streams.get(&stream_id) {
            if tx.send(StreamItem::Payload(payload)).await.is_err() {
                debug!(stream_id, "stream consumer dropped, payload discarded");
            }
        } else {
            debug!(stream_id, "data frame for unknown stream, dropping");
        }
    }

    /// Mark end-of-stream and remove the entry. A `STREAM_CLOSED` for an
    /// unregistered `streamId` is ignored (spec.md §4.4).
    pub async fn close(&mut self, stream_id: u32) {
        self.permits.remove(&stream_id);
        if let Some(tx) = self.streams.remove(&stream_id) {
            let _ = tx.send(StreamItem::Closed).await;
        }
    }

    /// Remove a stream entry without sending an explicit close marker
    /// (used when the sender side is dropped directly, e.g. cancellation).
    pub fn remove(&mut self, stream_id: u32) {
        self.permits.remove(&stream_id);
        self.streams.remove(&stream_id);
    }

    /// Tear a stream down because the session itself is gone (grace window
    /// elapsed), not because either side sent `STREAM_CLOSED`. Spec.md §4.3:
    /// "all pending unary calls fail with `UNEXPECTED_DISCONNECT`".
    pub async fn abort(&mut self, stream_id: u32) {
        self.permits.remove(&stream_id);
        if let Some(tx) = self.streams.remove(&stream_id) {
            let _ = tx.send(StreamItem::Disconnected).await;
        }
    }

    #[must_use]
    pub fn contains(&self, stream_id: u32) -> bool {
        self.streams.contains_key(&stream_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// All currently open stream ids, for session teardown.
    pub fn ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.streams.keys().copied()
    }
}
