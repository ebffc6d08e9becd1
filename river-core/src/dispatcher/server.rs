//! Server-side dispatch: routes a freshly opened stream to its registered
//! handler and drives the handler's response back onto the wire.
//!
//! Grounded in `river/transport.py::Transport.handle_messages_from_ws`'s
//! `STREAM_OPEN_BIT` branch (handler lookup, input/output channel sizing)
//! and `river/rpc.py`'s four `*_method_handler` wrappers (exception
//! capture, the `_convert_inputs`/`_convert_outputs` bridging for
//! upload/stream shapes, always closing the output side in `finally`).

use crate::codec_support::{encode_err, encode_ok, from_app_bytes};
use crate::handler::{HandlerContext, HandlerEntry, HandlerKind};
use crate::registry::{StreamCapacity, StreamItem, StreamRegistry};
use crate::session::{OutboundFrame, SessionHandle};
use river_common::AppError;
use river_protocol::frame::{FramePayload, TransportFrame, FLAG_ACK, FLAG_STREAM_CLOSED};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// A table of `(service, procedure) -> handler`, shared read-only across
/// every session a server accepts.
#[derive(Default, Clone)]
pub struct ServerDispatcher {
    handlers: Arc<HashMap<(String, String), HandlerEntry>>,
}

/// Builds a [`ServerDispatcher`]'s handler table before any sessions exist.
#[derive(Default)]
pub struct ServerDispatcherBuilder {
    handlers: HashMap<(String, String), HandlerEntry>,
}

impl ServerDispatcherBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn register(
        mut self,
        service: impl Into<String>,
        procedure: impl Into<String>,
        entry: HandlerEntry,
    ) -> Self {
        self.handlers.insert((service.into(), procedure.into()), entry);
        self
    }

    #[must_use]
    pub fn build(self) -> ServerDispatcher {
        ServerDispatcher {
            handlers: Arc::new(self.handlers),
        }
    }
}

impl ServerDispatcher {
    /// Handle a `STREAM_OPEN` frame for a `streamId` the session's registry
    /// doesn't yet know about: look up the target handler, seed its input
    /// queue with the frame that arrived with the open, and spawn the task
    /// that drives the handler to completion. Returns quickly so the
    /// session's receive loop can keep running; the handler itself runs in
    /// the background.
    pub async fn handle_open(
        &self,
        frame: TransportFrame,
        registry: &mut StreamRegistry,
        session: SessionHandle,
    ) {
        let Some(stream_id) = frame.stream_id else {
            return;
        };
        let (Some(service), Some(procedure)) = (&frame.service_name, &frame.procedure_name) else {
            warn!(stream_id, "STREAM_OPEN with no service/procedure, dropped");
            return;
        };

        let Some(entry) = self.handlers.get(&(service.clone(), procedure.clone())).cloned() else {
            debug!(service, procedure, "no handler registered, closing stream");
            let err = AppError::new(
                "NOT_IMPLEMENTED",
                format!("no handler registered for {service}.{procedure}"),
            );
            send_terminal_error(&session, stream_id, &err).await;
            return;
        };

        let capacity = if entry.kind().input_is_streaming() {
            StreamCapacity::Streaming
        } else {
            StreamCapacity::Unary
        };
        let input_rx = match registry.open(stream_id, capacity) {
            Ok(rx) => rx,
            Err(e) => {
                warn!(stream_id, error = %e, "failed to open stream for handler");
                return;
            }
        };

        if let FramePayload::App(bytes) = &frame.payload {
            registry.deliver(stream_id, bytes.clone()).await;
        }
        if frame.is_stream_closed() {
            registry.close(stream_id).await;
        }

        tokio::spawn(run_handler(entry, stream_id, input_rx, session));
    }
}

async fn send_terminal_error(session: &SessionHandle, stream_id: u32, err: &AppError) {
    match encode_err(err) {
        Ok(bytes) => {
            let _ = session
                .send(OutboundFrame {
                    stream_id: Some(stream_id),
                    service_name: None,
                    procedure_name: None,
                    control_flags: FLAG_ACK | FLAG_STREAM_CLOSED,
                    payload: FramePayload::App(bytes),
                })
                .await;
        }
        Err(e) => warn!(stream_id, error = %e, "failed to encode error envelope"),
    }
}

async fn send_terminal_ok(
    session: &SessionHandle,
    stream_id: u32,
    result: Result<serde_json::Value, AppError>,
) {
    let encoded = match result {
        Ok(value) => encode_ok(&value),
        Err(err) => encode_err(&err),
    };
    match encoded {
        Ok(bytes) => {
            let _ = session
                .send(OutboundFrame {
                    stream_id: Some(stream_id),
                    service_name: None,
                    procedure_name: None,
                    control_flags: FLAG_ACK | FLAG_STREAM_CLOSED,
                    payload: FramePayload::App(bytes),
                })
                .await;
        }
        Err(e) => warn!(stream_id, error = %e, "failed to encode response envelope"),
    }
}

/// Drain a raw inbound queue into a typed channel, decoding each payload and
/// stopping at the first decode failure or end-of-stream marker. Mirrors
/// `river/rpc.py`'s `_convert_inputs` helper for upload/stream handlers. A
/// `Disconnected` marker (session tear-down, spec.md §5) signals the
/// handler's abort channel in addition to ending its input, so a handler
/// blocked on `ctx.aborted()` alongside its own work notices promptly.
fn spawn_input_bridge(
    mut raw: mpsc::Receiver<StreamItem>,
    ctx: HandlerContext,
) -> mpsc::Receiver<serde_json::Value> {
    let (tx, rx) = mpsc::channel(StreamCapacity::Streaming.queue_depth());
    tokio::spawn(async move {
        while let Some(item) = raw.recv().await {
            match item {
                StreamItem::Payload(bytes) => match from_app_bytes::<serde_json::Value>(&bytes) {
                    Ok(value) => {
                        if tx.send(value).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "dropping undecodable upload item");
                    }
                },
                StreamItem::Closed => break,
                StreamItem::Disconnected => {
                    ctx.abort();
                    break;
                }
            }
        }
    });
    rx
}

/// Forward a handler's typed output channel onto the wire as plain data
/// frames, finishing with a `STREAM_CLOSED` close sentinel. Mirrors
/// `river/transport.py::Transport.send_responses`'s streaming branch.
async fn run_output_bridge(
    session: SessionHandle,
    stream_id: u32,
    mut output_rx: mpsc::Receiver<Result<serde_json::Value, AppError>>,
) {
    while let Some(item) = output_rx.recv().await {
        let encoded = match item {
            Ok(value) => encode_ok(&value),
            Err(err) => encode_err(&err),
        };
        match encoded {
            Ok(bytes) => {
                if session
                    .send(OutboundFrame::data(stream_id, FramePayload::App(bytes)))
                    .await
                    .is_err()
                {
                    return;
                }
            }
            Err(e) => warn!(stream_id, error = %e, "failed to encode streamed item"),
        }
    }
    let _ = session.send(OutboundFrame::close(stream_id)).await;
}

/// Message a panicking task's [`tokio::task::JoinError`] carries, or a
/// generic note if the panic payload wasn't a string.
fn panic_message(err: tokio::task::JoinError) -> String {
    err.try_into_panic()
        .ok()
        .and_then(|payload| {
            payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
        })
        .unwrap_or_else(|| "handler panicked".to_string())
}

/// Run a unary-response handler body (rpc/upload) on its own task so a panic
/// inside application code can't take the session actor down with it, and
/// surface it the way spec.md §4.6/§7 require: `{code: "UNCAUGHT_EXCEPTION",
/// message}` rather than a silently dropped stream. Mirrors `river/rpc.py`'s
/// blanket `except Exception` around every handler body.
async fn call_unary<F>(fut: F) -> Result<serde_json::Value, AppError>
where
    F: std::future::Future<Output = Result<serde_json::Value, AppError>> + Send + 'static,
{
    match tokio::spawn(fut).await {
        Ok(result) => result,
        Err(join_err) if join_err.is_panic() => Err(AppError::uncaught(panic_message(join_err))),
        Err(_) => Err(AppError::new("CANCELLED", "handler task was cancelled")),
    }
}

/// Same as [`call_unary`] for the streamed shapes (subscription/stream): the
/// handler drives `output` directly rather than returning a value, so a
/// caught panic is reported as one final error item on `output` instead of a
/// return value.
async fn call_streamed<F>(fut: F, output: mpsc::Sender<Result<serde_json::Value, AppError>>)
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    if let Err(join_err) = tokio::spawn(fut).await {
        if join_err.is_panic() {
            let _ = output
                .send(Err(AppError::uncaught(panic_message(join_err))))
                .await;
        }
    }
}

async fn run_handler(
    entry: HandlerEntry,
    stream_id: u32,
    input_rx: mpsc::Receiver<StreamItem>,
    session: SessionHandle,
) {
    let ctx = HandlerContext::new(session.remote_id().to_string());
    match entry {
        HandlerEntry::Rpc(handler) => {
            let value = match drain_single(input_rx, &ctx).await {
                Ok(v) => v,
                Err(err) => {
                    send_terminal_error(&session, stream_id, &err).await;
                    return;
                }
            };
            let result = call_unary(async move { handler.call(value, ctx).await }).await;
            send_terminal_ok(&session, stream_id, result).await;
        }
        HandlerEntry::Subscription(handler) => {
            let value = match drain_single(input_rx, &ctx).await {
                Ok(v) => v,
                Err(err) => {
                    send_terminal_error(&session, stream_id, &err).await;
                    return;
                }
            };
            let (out_tx, out_rx) = mpsc::channel(StreamCapacity::Streaming.queue_depth());
            let bridge = tokio::spawn(run_output_bridge(session.clone(), stream_id, out_rx));
            let out_tx_for_panic = out_tx.clone();
            call_streamed(
                async move { handler.call(value, ctx, out_tx).await },
                out_tx_for_panic,
            )
            .await;
            let _ = bridge.await;
        }
        HandlerEntry::Upload(handler) => {
            let typed_rx = spawn_input_bridge(input_rx, ctx.clone());
            let result = call_unary(async move { handler.call(typed_rx, ctx).await }).await;
            send_terminal_ok(&session, stream_id, result).await;
        }
        HandlerEntry::Stream(handler) => {
            let typed_rx = spawn_input_bridge(input_rx, ctx.clone());
            let (out_tx, out_rx) = mpsc::channel(StreamCapacity::Streaming.queue_depth());
            let bridge = tokio::spawn(run_output_bridge(session.clone(), stream_id, out_rx));
            let out_tx_for_panic = out_tx.clone();
            call_streamed(
                async move { handler.call(typed_rx, ctx, out_tx).await },
                out_tx_for_panic,
            )
            .await;
            let _ = bridge.await;
        }
    }
}

/// Pull exactly the one item a unary (rpc/subscription) request carries. A
/// session tear-down arriving before the open frame's payload is fully
/// delivered (rare — `handle_open` delivers it synchronously before
/// spawning this task) signals the handler's abort channel the same way
/// spec.md §5 describes for in-flight handlers generally.
async fn drain_single(
    mut rx: mpsc::Receiver<StreamItem>,
    ctx: &HandlerContext,
) -> Result<serde_json::Value, AppError> {
    match rx.recv().await {
        Some(StreamItem::Payload(bytes)) => from_app_bytes::<serde_json::Value>(&bytes)
            .map_err(|e| AppError::new("BAD_REQUEST", e.to_string())),
        Some(StreamItem::Closed) | None => {
            Err(AppError::new("BAD_REQUEST", "request closed with no payload"))
        }
        Some(StreamItem::Disconnected) => {
            ctx.abort();
            Err(AppError::new("UNEXPECTED_DISCONNECT", "session disconnected before request arrived"))
        }
    }
}
