//! Handler contract: the four RPC shapes exposed to application code.
//!
//! Grounded in `river/rpc.py`'s `rpc_method_handler`, `subscription_method_handler`,
//! `upload_method_handler`, `stream_method_handler`: each wraps a typed method
//! into a generic `(peer, input, output) -> ()` coroutine operating on
//! untyped channels. There is no code-generation collaborator in this crate
//! (out of scope per spec.md §1), so handlers here operate on
//! `serde_json::Value` — the stand-in for a generated request/response type,
//! matching `river-core::codec_support`'s choice of `serde_json` as the
//! self-describing wire format for application payloads.

use async_trait::async_trait;
use river_common::AppError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};

/// Context handed to every handler invocation: the remote peer identifier
/// and an abort channel (spec.md §4.7).
#[derive(Clone)]
pub struct HandlerContext {
    peer: String,
    aborted: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl HandlerContext {
    #[must_use]
    pub fn new(peer: impl Into<String>) -> Self {
        Self {
            peer: peer.into(),
            aborted: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    #[must_use]
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Abort the context. The dispatcher observes this and emits an error
    /// payload, closing the stream.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Resolves once the context is aborted; handlers can `select!` on this
    /// alongside their own work to react to cancellation promptly.
    pub async fn aborted(&self) {
        while !self.is_aborted() {
            self.notify.notified().await;
        }
    }
}

/// One-shot request -> one-shot response or error.
#[async_trait]
pub trait RpcHandler: Send + Sync {
    async fn call(
        &self,
        request: serde_json::Value,
        ctx: HandlerContext,
    ) -> Result<serde_json::Value, AppError>;
}

/// One-shot request -> lazy output sequence, each item `Ok` or `Err`.
#[async_trait]
pub trait SubscriptionHandler: Send + Sync {
    async fn call(
        &self,
        request: serde_json::Value,
        ctx: HandlerContext,
        output: mpsc::Sender<Result<serde_json::Value, AppError>>,
    );
}

/// Lazy input sequence -> one-shot response or error.
#[async_trait]
pub trait UploadHandler: Send + Sync {
    async fn call(
        &self,
        input: mpsc::Receiver<serde_json::Value>,
        ctx: HandlerContext,
    ) -> Result<serde_json::Value, AppError>;
}

/// Lazy input sequence -> lazy output sequence.
#[async_trait]
pub trait StreamHandler: Send + Sync {
    async fn call(
        &self,
        input: mpsc::Receiver<serde_json::Value>,
        ctx: HandlerContext,
        output: mpsc::Sender<Result<serde_json::Value, AppError>>,
    );
}

/// A registered handler, tagged by its shape so the server dispatcher knows
/// how many queues to create and how to drive them (spec.md §4.6).
#[derive(Clone)]
pub enum HandlerEntry {
    Rpc(Arc<dyn RpcHandler>),
    Subscription(Arc<dyn SubscriptionHandler>),
    Upload(Arc<dyn UploadHandler>),
    Stream(Arc<dyn StreamHandler>),
}

impl HandlerEntry {
    #[must_use]
    pub fn kind(&self) -> HandlerKind {
        match self {
            HandlerEntry::Rpc(_) => HandlerKind::Rpc,
            HandlerEntry::Subscription(_) => HandlerKind::Subscription,
            HandlerEntry::Upload(_) => HandlerKind::Upload,
            HandlerEntry::Stream(_) => HandlerKind::Stream,
        }
    }
}

/// The four handler shapes (spec.md §4.7 / glossary).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    Rpc,
    Subscription,
    Upload,
    Stream,
}

impl HandlerKind {
    /// Whether this side's *input* is a single item (rpc/subscription) or a
    /// lazy sequence (upload/stream).
    #[must_use]
    pub fn input_is_streaming(self) -> bool {
        matches!(self, HandlerKind::Upload | HandlerKind::Stream)
    }

    /// Whether this side's *output* is a single item (rpc/upload) or a lazy
    /// sequence (subscription/stream).
    #[must_use]
    pub fn output_is_streaming(self) -> bool {
        matches!(self, HandlerKind::Subscription | HandlerKind::Stream)
    }
}
