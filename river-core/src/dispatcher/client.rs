//! Client-side dispatch: the four call shapes an application makes against
//! a remote service.
//!
//! Grounded in `river/client.py`'s `send_rpc`/`send_subscription`/
//! `send_upload`/`send_stream`, re-expressed against [`SessionHandle`]
//! instead of a direct websocket handle, since the session actor now owns
//! sequencing and the stream registry.

use super::StreamIdAllocator;
use crate::codec_support::{decode_envelope, to_app_bytes, Outcome};
use crate::registry::{StreamCapacity, StreamItem};
use crate::session::{OutboundFrame, SessionHandle};
use river_common::{Result, RiverError};
use river_protocol::frame::{FramePayload, FLAG_STREAM_CLOSED, FLAG_STREAM_OPEN};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

/// Sends calls over one [`SessionHandle`] and decodes their responses.
pub struct ClientDispatcher {
    session: SessionHandle,
    stream_ids: StreamIdAllocator,
}

impl ClientDispatcher {
    #[must_use]
    pub fn new(session: SessionHandle) -> Self {
        Self {
            session,
            stream_ids: StreamIdAllocator::new(),
        }
    }

    fn decode_response(payload: &[u8], service: &str, procedure: &str) -> Result<Value> {
        match decode_envelope(payload)? {
            Outcome::Ok(value) => Ok(value),
            Outcome::Err(err) => {
                debug!(service, procedure, code = %err.code, "call returned application error");
                Err(RiverError::App(err))
            }
        }
    }

    /// One-shot request/response (spec.md §4.7 unary shape).
    pub async fn call_rpc(&self, service: &str, procedure: &str, request: Value) -> Result<Value> {
        let stream_id = self.stream_ids.next();
        let mut rx = self
            .session
            .open_stream(stream_id, StreamCapacity::Unary)
            .await?;

        let bytes = to_app_bytes(&request)?;
        self.session
            .send(OutboundFrame {
                stream_id: Some(stream_id),
                service_name: Some(service.to_string()),
                procedure_name: Some(procedure.to_string()),
                control_flags: FLAG_STREAM_OPEN | FLAG_STREAM_CLOSED,
                payload: FramePayload::App(bytes),
            })
            .await?;

        match rx.recv().await {
            Some(StreamItem::Payload(payload)) => Self::decode_response(&payload, service, procedure),
            Some(StreamItem::Disconnected) => Err(RiverError::UnexpectedDisconnect),
            _ => Err(RiverError::StreamClosed(format!("{service}.{procedure}"))),
        }
    }

    /// One-shot request -> lazy response sequence (spec.md §4.7 subscription
    /// shape). The returned channel yields decoded items until the server
    /// sends its close sentinel or the session ends.
    pub async fn call_subscription(
        &self,
        service: &str,
        procedure: &str,
        request: Value,
    ) -> Result<mpsc::Receiver<Result<Value>>> {
        let stream_id = self.stream_ids.next();
        let mut rx = self
            .session
            .open_stream(stream_id, StreamCapacity::Streaming)
            .await?;

        let bytes = to_app_bytes(&request)?;
        self.session
            .send(OutboundFrame {
                stream_id: Some(stream_id),
                service_name: Some(service.to_string()),
                procedure_name: Some(procedure.to_string()),
                control_flags: FLAG_STREAM_OPEN,
                payload: FramePayload::App(bytes),
            })
            .await?;

        let (out_tx, out_rx) = mpsc::channel(StreamCapacity::Streaming.queue_depth());
        let session = self.session.clone();
        tokio::spawn(forward_decoded(rx, out_tx, session, stream_id));
        Ok(out_rx)
    }

    /// Lazy request sequence -> one-shot response (spec.md §4.7 upload
    /// shape). `input` is drained to completion before the call resolves.
    pub async fn call_upload(
        &self,
        service: &str,
        procedure: &str,
        mut input: mpsc::Receiver<Value>,
    ) -> Result<Value> {
        let stream_id = self.stream_ids.next();
        let mut rx = self
            .session
            .open_stream(stream_id, StreamCapacity::Unary)
            .await?;

        match input.recv().await {
            Some(first) => {
                let bytes = to_app_bytes(&first)?;
                self.session
                    .send(OutboundFrame {
                        stream_id: Some(stream_id),
                        service_name: Some(service.to_string()),
                        procedure_name: Some(procedure.to_string()),
                        control_flags: FLAG_STREAM_OPEN,
                        payload: FramePayload::App(bytes),
                    })
                    .await?;
            }
            None => {
                self.session
                    .send(OutboundFrame {
                        stream_id: Some(stream_id),
                        service_name: Some(service.to_string()),
                        procedure_name: Some(procedure.to_string()),
                        control_flags: FLAG_STREAM_OPEN,
                        payload: FramePayload::Close,
                    })
                    .await?;
            }
        }

        while let Some(item) = input.recv().await {
            let bytes = to_app_bytes(&item)?;
            self.session
                .send(OutboundFrame::data(stream_id, FramePayload::App(bytes)))
                .await?;
        }
        self.session.send(OutboundFrame::close(stream_id)).await?;

        match rx.recv().await {
            Some(StreamItem::Payload(payload)) => Self::decode_response(&payload, service, procedure),
            Some(StreamItem::Disconnected) => Err(RiverError::UnexpectedDisconnect),
            _ => Err(RiverError::StreamClosed(format!("{service}.{procedure}"))),
        }
    }

    /// Lazy request sequence -> lazy response sequence (spec.md §4.7 bidi
    /// shape). Spawns a background task to drain `input` while returning the
    /// output channel immediately, so caller code can interleave sending and
    /// receiving.
    pub async fn call_stream(
        &self,
        service: &str,
        procedure: &str,
        mut input: mpsc::Receiver<Value>,
    ) -> Result<mpsc::Receiver<Result<Value>>> {
        let stream_id = self.stream_ids.next();
        let mut rx = self
            .session
            .open_stream(stream_id, StreamCapacity::Streaming)
            .await?;

        match input.recv().await {
            Some(first) => {
                let bytes = to_app_bytes(&first)?;
                self.session
                    .send(OutboundFrame {
                        stream_id: Some(stream_id),
                        service_name: Some(service.to_string()),
                        procedure_name: Some(procedure.to_string()),
                        control_flags: FLAG_STREAM_OPEN,
                        payload: FramePayload::App(bytes),
                    })
                    .await?;
            }
            None => {
                self.session
                    .send(OutboundFrame {
                        stream_id: Some(stream_id),
                        service_name: Some(service.to_string()),
                        procedure_name: Some(procedure.to_string()),
                        control_flags: FLAG_STREAM_OPEN,
                        payload: FramePayload::Close,
                    })
                    .await?;
            }
        }

        let send_session = self.session.clone();
        tokio::spawn(async move {
            while let Some(item) = input.recv().await {
                let Ok(bytes) = to_app_bytes(&item) else {
                    break;
                };
                if send_session
                    .send(OutboundFrame::data(stream_id, FramePayload::App(bytes)))
                    .await
                    .is_err()
                {
                    return;
                }
            }
            let _ = send_session.send(OutboundFrame::close(stream_id)).await;
        });

        let (out_tx, out_rx) = mpsc::channel(StreamCapacity::Streaming.queue_depth());
        let session = self.session.clone();
        tokio::spawn(forward_decoded(rx, out_tx, session, stream_id));
        Ok(out_rx)
    }
}

/// Drains a stream's raw inbound queue into a decoded channel, shared by
/// `call_subscription` and `call_stream`. If the caller drops the returned
/// receiver before the peer sends its close sentinel, that's the
/// cancellation path of spec.md §4.5: send a `STREAM_CLOSED` frame for this
/// `streamId` and remove it from the local registry so it isn't left
/// half-open.
async fn forward_decoded(
    mut rx: mpsc::Receiver<StreamItem>,
    out_tx: mpsc::Sender<Result<Value>>,
    session: SessionHandle,
    stream_id: u32,
) {
    while let Some(item) = rx.recv().await {
        match item {
            StreamItem::Payload(payload) => match decode_envelope(&payload) {
                Ok(Outcome::Ok(value)) => {
                    if out_tx.send(Ok(value)).await.is_err() {
                        let _ = session.send(OutboundFrame::close(stream_id)).await;
                        session.close_stream(stream_id).await;
                        return;
                    }
                }
                Ok(Outcome::Err(err)) => {
                    if out_tx.send(Err(RiverError::App(err))).await.is_err() {
                        let _ = session.send(OutboundFrame::close(stream_id)).await;
                        session.close_stream(stream_id).await;
                        return;
                    }
                }
                Err(e) => {
                    let _ = out_tx.send(Err(e)).await;
                    return;
                }
            },
            StreamItem::Closed => return,
            StreamItem::Disconnected => {
                let _ = out_tx.send(Err(RiverError::UnexpectedDisconnect)).await;
                return;
            }
        }
    }
}
