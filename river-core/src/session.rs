//! Session: per-peer handshake, resend buffer, heartbeat, reconnect-and-resume.
//!
//! Grounded in `river/transport.py::Transport` (the message loop, handshake,
//! heartbeat) and `river/client.py::Client._handle_messages` (client-side
//! handshake + receive loop), re-architected so one actor task owns the
//! sequence manager, resend buffer, and stream registry exclusively, none of
//! them needing a lock the way the Python version's `asyncio.Lock`-guarded
//! `SeqManager` does. The actor shape (one `tokio::select!` loop reading
//! inbound frames, a command channel, and a heartbeat ticker) follows
//! `ferrotunnel-core::tunnel::client::TunnelClient::connect_and_run` /
//! `tunnel::server::TunnelServer::process_messages`.

use crate::registry::{RegistryError, StreamCapacity, StreamItem, StreamRegistry};
use crate::resend::ResendBuffer;
use crate::resource_limits::StreamLimits;
use crate::sequence::{SeqOutcome, SequenceManager};
use crate::transport::BoxedConnection;
use futures::{SinkExt, StreamExt};
use river_common::{Result, RiverError};
use river_protocol::codec::FrameCodec;
use river_protocol::frame::{
    FLAG_ACK, FLAG_STREAM_CLOSED, FramePayload, HandshakeRequest, HandshakeResponse,
    HandshakeStatus, ProtocolVersion, TransportFrame,
};
use river_protocol::validation::{validate_frame, ValidationLimits};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

/// A connection framed with the River wire codec, generic over the
/// underlying byte connection (TCP, WebSocket, or an in-memory duplex pair
/// in tests).
pub type FramedConnection = Framed<BoxedConnection, FrameCodec>;

/// An outbound frame as requested by a dispatcher, before the session has
/// stamped `id`/`seq`/`ack` onto it (spec.md §4.3 send path).
#[derive(Debug, Clone)]
pub struct OutboundFrame {
    pub stream_id: Option<u32>,
    pub service_name: Option<String>,
    pub procedure_name: Option<String>,
    pub control_flags: u8,
    pub payload: FramePayload,
}

impl OutboundFrame {
    #[must_use]
    pub fn data(stream_id: u32, payload: FramePayload) -> Self {
        Self {
            stream_id: Some(stream_id),
            service_name: None,
            procedure_name: None,
            control_flags: 0,
            payload,
        }
    }

    #[must_use]
    pub fn close(stream_id: u32) -> Self {
        Self {
            stream_id: Some(stream_id),
            service_name: None,
            procedure_name: None,
            control_flags: FLAG_STREAM_CLOSED,
            payload: FramePayload::Close,
        }
    }
}

/// Requests a dispatcher (client or server side) sends to the session actor
/// that owns the registry/sequence/resend state exclusively.
pub enum SessionCommand {
    OpenStream {
        stream_id: u32,
        capacity: StreamCapacity,
        reply: oneshot::Sender<std::result::Result<mpsc::Receiver<StreamItem>, RegistryError>>,
    },
    Send(OutboundFrame),
    CloseStream(u32),
    Shutdown,
}

/// Clonable front-end used by dispatchers to talk to the session actor that
/// owns the connection, sequence manager, and stream registry.
#[derive(Clone)]
pub struct SessionHandle {
    cmd_tx: mpsc::Sender<SessionCommand>,
    local_id: std::sync::Arc<str>,
    remote_id: std::sync::Arc<str>,
}

impl SessionHandle {
    #[must_use]
    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    #[must_use]
    pub fn remote_id(&self) -> &str {
        &self.remote_id
    }

    pub async fn open_stream(
        &self,
        stream_id: u32,
        capacity: StreamCapacity,
    ) -> Result<mpsc::Receiver<StreamItem>> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(SessionCommand::OpenStream {
                stream_id,
                capacity,
                reply,
            })
            .await
            .map_err(|_| RiverError::UnexpectedDisconnect)?;
        rx.await
            .map_err(|_| RiverError::UnexpectedDisconnect)?
            .map_err(|e| RiverError::ProtocolViolation(e.to_string()))
    }

    pub async fn send(&self, frame: OutboundFrame) -> Result<()> {
        self.cmd_tx
            .send(SessionCommand::Send(frame))
            .await
            .map_err(|_| RiverError::UnexpectedDisconnect)
    }

    pub async fn close_stream(&self, stream_id: u32) {
        let _ = self.cmd_tx.send(SessionCommand::CloseStream(stream_id)).await;
    }

    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(SessionCommand::Shutdown).await;
    }
}

/// Tuning knobs for a session's liveness and resend behavior, sourced from
/// `RiverConfig` (spec.md §6 environment variables).
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub heartbeat_interval: Duration,
    pub heartbeats_until_dead: u32,
    pub session_disconnect_grace: Duration,
    pub protocol_version: ProtocolVersion,
    pub validation_limits: ValidationLimits,
}

/// Why a session's connected run loop stopped.
#[derive(Debug)]
pub enum SessionExit {
    /// The byte connection failed or returned EOF.
    Disconnected,
    /// Invariant 2 violation: a gap in `seq`, or a malformed control frame.
    ProtocolViolation(String),
    /// A `SessionCommand::Shutdown` was received, or the command channel closed.
    Shutdown,
}

/// A frame that could not be routed to an already-open stream: either the
/// opening frame of a brand new stream (server-side: dispatch to a handler),
/// or a frame for a `streamId` nobody recognizes (dropped per spec.md §4.4).
pub enum Routed {
    /// Delivered into (or used to close) an already-registered stream, or was
    /// a pure control frame (heartbeat ack) with no stream attached.
    Handled,
    /// `STREAM_OPEN` for a `streamId` with no registry entry: a new stream a
    /// server-side caller should open and dispatch.
    Open(TransportFrame),
    /// A data/close frame for a `streamId` with no registry entry, dropped.
    UnknownStream,
}

/// Build a `HANDSHAKE_RESP` frame. Free-standing because the accept loop
/// needs to reply on a resumed session's behalf before (or without) handing
/// the connection to that session's own actor task; the response itself
/// never passes through [`SequenceManager::observe`] on the receiving end,
/// so its own `seq` carries no protocol weight and is left at zero, but
/// `ack` must reflect the replying side's `expectedRecv` (spec.md §4.2) so
/// the peer learns what the handshake frame's `seq` was taken to mean.
#[must_use]
pub fn handshake_response(local_id: &str, remote_id: &str, ack: u64, status: HandshakeStatus) -> TransportFrame {
    TransportFrame {
        id: uuid::Uuid::new_v4().to_string(),
        from: local_id.to_string(),
        to: remote_id.to_string(),
        seq: 0,
        ack,
        stream_id: None,
        service_name: None,
        procedure_name: None,
        control_flags: 0,
        payload: FramePayload::HandshakeResponse(HandshakeResponse { status }),
    }
}

/// The session actor: owns the sequence manager, resend buffer, and stream
/// registry for one `(localId, remoteId)` pair, across however many
/// underlying byte connections it lives through.
pub struct Session {
    local_id: String,
    remote_id: String,
    instance_id: String,
    config: SessionConfig,
    sequence: SequenceManager,
    resend: ResendBuffer,
    registry: StreamRegistry,
}

impl Session {
    /// `stream_limits` enforces a per-session cap on concurrently open
    /// streams (spec.md §5); pass `None` for client sessions, which have no
    /// server-side admission concept to enforce.
    #[must_use]
    pub fn new(
        local_id: impl Into<String>,
        remote_id: impl Into<String>,
        instance_id: impl Into<String>,
        config: SessionConfig,
        stream_limits: Option<StreamLimits>,
    ) -> Self {
        Self {
            local_id: local_id.into(),
            remote_id: remote_id.into(),
            instance_id: instance_id.into(),
            config,
            sequence: SequenceManager::new(),
            resend: ResendBuffer::new(),
            registry: match stream_limits {
                Some(limits) => StreamRegistry::with_limits(limits),
                None => StreamRegistry::new(),
            },
        }
    }

    #[must_use]
    pub fn remote_id(&self) -> &str {
        &self.remote_id
    }

    #[must_use]
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    fn stamp(&mut self, of: OutboundFrame) -> TransportFrame {
        let seq = self.sequence.stamp();
        TransportFrame {
            id: uuid::Uuid::new_v4().to_string(),
            from: self.local_id.clone(),
            to: self.remote_id.clone(),
            seq,
            ack: self.sequence.current_ack(),
            stream_id: of.stream_id,
            service_name: of.service_name,
            procedure_name: of.procedure_name,
            control_flags: of.control_flags,
            payload: of.payload,
        }
    }

    fn heartbeat_frame(&mut self) -> TransportFrame {
        self.stamp(OutboundFrame {
            stream_id: None,
            service_name: None,
            procedure_name: None,
            control_flags: FLAG_ACK,
            payload: FramePayload::Close,
        })
    }

    /// Perform the client side of a handshake over a freshly connected byte
    /// connection. On success the session is ready for [`Session::run`].
    pub async fn client_handshake(
        &mut self,
        framed: &mut FramedConnection,
    ) -> Result<HandshakeStatus> {
        let req = TransportFrame {
            id: uuid::Uuid::new_v4().to_string(),
            from: self.local_id.clone(),
            to: self.remote_id.clone(),
            seq: self.sequence.stamp(),
            ack: self.sequence.current_ack(),
            stream_id: None,
            service_name: None,
            procedure_name: None,
            control_flags: 0,
            payload: FramePayload::HandshakeRequest(HandshakeRequest {
                protocol_version: self.config.protocol_version,
                instance_id: self.instance_id.clone(),
            }),
        };
        framed
            .send(req)
            .await
            .map_err(|e| RiverError::Io(std::io::Error::other(e.to_string())))?;

        let resp = framed
            .next()
            .await
            .ok_or(RiverError::UnexpectedDisconnect)?
            .map_err(|e| RiverError::ProtocolViolation(e.to_string()))?;

        match resp.payload {
            FramePayload::HandshakeResponse(HandshakeResponse { status }) => {
                if status.ok {
                    info!(remote = %self.remote_id, "handshake succeeded");
                } else {
                    warn!(reason = ?status.reason, "handshake rejected by peer");
                }
                Ok(status)
            }
            _ => Err(RiverError::ProtocolViolation(
                "expected HANDSHAKE_RESP as first frame".into(),
            )),
        }
    }

    /// Perform the server side of a handshake: read the client's
    /// `HANDSHAKE_REQ` (already pulled off the wire by the accept loop so it
    /// can be routed to the right session) and reply. `req_seq` is the
    /// `seq` the handshake frame itself was stamped with (always 0 on a
    /// fresh session, per spec.md §4.2); it must pass through
    /// [`SequenceManager::observe`] like any other inbound frame so the
    /// server's `expectedRecv` agrees with the client's `sendSeq` before the
    /// first real frame arrives.
    pub async fn server_handshake(
        &mut self,
        framed: &mut FramedConnection,
        req: &HandshakeRequest,
        req_seq: u64,
    ) -> Result<()> {
        if matches!(self.sequence.observe(req_seq), SeqOutcome::Gap) {
            return Err(RiverError::ProtocolViolation(format!(
                "handshake frame carried unexpected seq {req_seq}"
            )));
        }

        let ok = req.protocol_version == ProtocolVersion::V1
            || req.protocol_version == ProtocolVersion::V2;
        let status = HandshakeStatus {
            ok,
            instance_id: if ok { Some(self.local_id.clone()) } else { None },
            reason: if ok {
                None
            } else {
                Some("unsupported protocol version".into())
            },
        };
        let resp = handshake_response(&self.local_id, &self.remote_id, self.sequence.current_ack(), status);
        framed
            .send(resp)
            .await
            .map_err(|e| RiverError::Io(std::io::Error::other(e.to_string())))?;
        if !ok {
            return Err(RiverError::ProtocolViolation(
                "protocol version rejected".into(),
            ));
        }
        Ok(())
    }

    /// Classify and apply one inbound frame: semantic validation, dedup/gap
    /// check, resend-buffer pruning (invariant 5), and routing to the
    /// stream registry.
    async fn route_inbound(&mut self, frame: TransportFrame) -> std::result::Result<Routed, SessionExit> {
        if let Err(e) = validate_frame(&frame, &self.config.validation_limits) {
            return Err(SessionExit::ProtocolViolation(format!(
                "frame failed validation: {e}"
            )));
        }

        match self.sequence.observe(frame.seq) {
            SeqOutcome::Duplicate => {
                debug!(seq = frame.seq, "duplicate frame, dropped");
                return Ok(Routed::Handled);
            }
            SeqOutcome::Gap => {
                return Err(SessionExit::ProtocolViolation(format!(
                    "sequence gap: got {}, expected {}",
                    frame.seq,
                    self.sequence.current_ack()
                )));
            }
            SeqOutcome::Delivered => {}
        }
        self.resend.prune_acked(frame.ack);

        let Some(stream_id) = frame.stream_id else {
            // Pure control frame (heartbeat ack): nothing further to do, the
            // seq/ack bookkeeping above already recorded it.
            return Ok(Routed::Handled);
        };

        if frame.is_stream_open() && !self.registry.contains(stream_id) {
            return Ok(Routed::Open(frame));
        }
        if !self.registry.contains(stream_id) {
            if frame.is_stream_closed() {
                debug!(stream_id, "STREAM_CLOSED for unknown stream, ignored");
            } else {
                debug!(stream_id, "data frame for unknown stream, dropped");
            }
            return Ok(Routed::UnknownStream);
        }

        let is_close_sentinel = frame.is_stream_closed() && matches!(frame.payload, FramePayload::Close);
        if !is_close_sentinel {
            if let FramePayload::App(bytes) = frame.payload {
                self.registry.deliver(stream_id, bytes).await;
            }
        }
        if frame.is_stream_closed() {
            self.registry.close(stream_id).await;
        }
        Ok(Routed::Handled)
    }

    /// Drive one connected byte connection until it disconnects, a protocol
    /// violation occurs, or shutdown is requested. `on_open` is invoked for
    /// every `STREAM_OPEN` frame this session doesn't already know about
    /// (server-side dispatch hook; clients pass a no-op that drops it, since
    /// a well-behaved peer never opens a stream towards a client in this
    /// protocol).
    pub async fn run<F, Fut>(
        &mut self,
        mut framed: FramedConnection,
        cmd_rx: &mut mpsc::Receiver<SessionCommand>,
        mut on_open: F,
    ) -> SessionExit
    where
        F: FnMut(TransportFrame, &mut StreamRegistry) -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        let mut heartbeat = tokio::time::interval(self.config.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut missed: u32 = 0;

        loop {
            tokio::select! {
                biased;

                frame = framed.next() => {
                    match frame {
                        Some(Ok(f)) => {
                            missed = 0;
                            match self.route_inbound(f).await {
                                Ok(Routed::Open(open_frame)) => on_open(open_frame, &mut self.registry).await,
                                Ok(_) => {}
                                Err(exit) => return exit,
                            }
                        }
                        Some(Err(e)) => {
                            warn!(error = %e, "frame decode error, disconnecting");
                            return SessionExit::Disconnected;
                        }
                        None => return SessionExit::Disconnected,
                    }
                }

                _ = heartbeat.tick() => {
                    missed += 1;
                    if missed >= self.config.heartbeats_until_dead {
                        warn!(remote = %self.remote_id, "missed too many heartbeats, disconnecting");
                        return SessionExit::Disconnected;
                    }
                    let hb = self.heartbeat_frame();
                    if framed.send(hb).await.is_err() {
                        return SessionExit::Disconnected;
                    }
                }

                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(SessionCommand::OpenStream { stream_id, capacity, reply }) => {
                            let _ = reply.send(self.registry.open(stream_id, capacity));
                        }
                        Some(SessionCommand::Send(of)) => {
                            let frame = self.stamp(of);
                            self.resend.push(frame.clone());
                            if framed.send(frame).await.is_err() {
                                return SessionExit::Disconnected;
                            }
                        }
                        Some(SessionCommand::CloseStream(id)) => {
                            self.registry.close(id).await;
                        }
                        Some(SessionCommand::Shutdown) | None => return SessionExit::Shutdown,
                    }
                }
            }
        }
    }

    /// Tear down: close every live stream with `UNEXPECTED_DISCONNECT`
    /// (spec.md §4.3, grace window expiry).
    pub async fn teardown(&mut self) {
        for id in self.registry.ids().collect::<Vec<_>>() {
            self.registry.abort(id).await;
        }
    }

    /// Replay every buffered unacknowledged frame after a reconnect, per
    /// spec.md §4.3: frames with `seq >= peer.ack` from the handshake
    /// response, or (if the peer reported no ack) every buffered frame.
    pub async fn replay(&mut self, framed: &mut FramedConnection, peer_ack: Option<u64>) -> Result<()> {
        let from = peer_ack.unwrap_or(0);
        let frames: Vec<TransportFrame> = self.resend.frames_from(from).cloned().collect();
        for frame in frames {
            framed
                .send(frame)
                .await
                .map_err(|e| RiverError::Io(std::io::Error::other(e.to_string())))?;
        }
        Ok(())
    }

    /// Build the clonable handle dispatchers use to submit commands to this
    /// session's actor loop.
    #[must_use]
    pub fn handle(&self, cmd_tx: mpsc::Sender<SessionCommand>) -> SessionHandle {
        SessionHandle {
            cmd_tx,
            local_id: self.local_id.clone().into(),
            remote_id: self.remote_id.clone().into(),
        }
    }

    #[must_use]
    pub fn grace(&self) -> Duration {
        self.config.session_disconnect_grace
    }
}
