//! Client and server dispatch: turns the four handler shapes (spec.md §4.7)
//! into frames sent and delivered through a [`crate::session::Session`].

pub mod client;
pub mod server;

use std::sync::atomic::{AtomicU32, Ordering};

/// Allocates fresh, session-unique `streamId`s. Grounded in `river/client.py`,
/// which keeps a plain incrementing counter per `Client` instance; `streamId`
/// reuse is only legal once both sides have observed `STREAM_CLOSED`
/// (invariant 4), so a monotonic counter trivially satisfies that as long as
/// it doesn't wrap within a session's lifetime.
#[derive(Debug, Default)]
pub struct StreamIdAllocator {
    next: AtomicU32,
}

impl StreamIdAllocator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> u32 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}
