//! Top-level server: accepts byte connections, performs the handshake, and
//! routes each one to its per-remote-id [`Session`] actor.
//!
//! Grounded in `ferrotunnel-core::tunnel::server::TunnelServer`'s accept
//! loop (`run`/`handle_connection`) for the overall shape — accept, limit,
//! handshake, dispatch to a per-connection task — and in
//! `ferrotunnel-core::tunnel::session::SessionStore` for the collision rule,
//! rekeyed here on River's `(remoteId, instanceId)` pair (spec.md §4.3 last
//! paragraph) instead of FerroTunnel's `tunnel_id`: the same remote id
//! reconnecting with the same instance id resumes its session, while a
//! different instance id evicts the old one.

use crate::dispatcher::server::ServerDispatcher;
use crate::resource_limits::{ServerResourceLimits, SessionPermit};
use crate::session::{handshake_response, Session, SessionCommand, SessionConfig, SessionExit, SessionHandle};
use crate::transport::BoxedConnection;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use river_common::{Result, RiverError};
use river_protocol::codec::FrameCodec;
use river_protocol::frame::{FramePayload, HandshakeRequest, HandshakeStatus};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tracing::{info, warn};

type FramedConnection = Framed<BoxedConnection, FrameCodec>;

struct LiveSession {
    instance_id: String,
    conn_tx: mpsc::Sender<FramedConnection>,
    cmd_tx: mpsc::Sender<SessionCommand>,
}

/// Accepts connections, performs handshakes, and owns the remote-id-keyed
/// table of live sessions. Transport-agnostic: callers run their own accept
/// loop (TCP, WebSocket, or both) and hand each accepted connection to
/// [`RiverServer::accept_connection`].
#[derive(Clone)]
pub struct RiverServer {
    local_id: Arc<str>,
    dispatcher: ServerDispatcher,
    config: SessionConfig,
    limits: Arc<ServerResourceLimits>,
    sessions: Arc<DashMap<String, LiveSession>>,
}

impl RiverServer {
    #[must_use]
    pub fn new(
        local_id: impl Into<String>,
        dispatcher: ServerDispatcher,
        config: SessionConfig,
        limits: ServerResourceLimits,
    ) -> Self {
        Self {
            local_id: Arc::from(local_id.into()),
            dispatcher,
            config,
            limits: Arc::new(limits),
            sessions: Arc::new(DashMap::new()),
        }
    }

    /// Number of sessions currently tracked (connected or within their grace
    /// window).
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Accept and handshake one freshly connected byte connection. Spawns
    /// the task that drives the session's full lifecycle, including
    /// reconnect-and-resume; returns once the handshake has been resolved
    /// (accepted, rejected, or handed off to an existing session), so the
    /// caller's accept loop can keep accepting immediately.
    pub async fn accept_connection(&self, stream: BoxedConnection) {
        let permit = match self.limits.try_acquire_session() {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "rejecting connection, session limit reached");
                return;
            }
        };

        let mut framed: FramedConnection = Framed::new(stream, FrameCodec::new());
        let (remote_id, req, req_seq) = match read_handshake_request(&mut framed).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "handshake read failed");
                return;
            }
        };

        let existing = self
            .sessions
            .get(&remote_id)
            .map(|e| (e.instance_id.clone(), e.conn_tx.clone(), e.cmd_tx.clone()));

        match existing {
            Some((instance_id, conn_tx, _)) if instance_id == req.instance_id => {
                let status = HandshakeStatus {
                    ok: true,
                    instance_id: Some(self.local_id.to_string()),
                    reason: None,
                };
                let resp = handshake_response(&self.local_id, &remote_id, 0, status);
                if framed.send(resp).await.is_err() {
                    return;
                }
                info!(remote = %remote_id, "resuming existing session");
                if conn_tx.send(framed).await.is_err() {
                    warn!(remote = %remote_id, "session task gone, dropping resumed connection");
                }
                return;
            }
            Some((_, _, cmd_tx)) => {
                info!(remote = %remote_id, "instance id changed, replacing session");
                let _ = cmd_tx.send(SessionCommand::Shutdown).await;
                self.sessions.remove(&remote_id);
            }
            None => {}
        }

        self.spawn_new_session(remote_id, req, req_seq, framed, permit).await;
    }

    async fn spawn_new_session(
        &self,
        remote_id: String,
        req: HandshakeRequest,
        req_seq: u64,
        mut framed: FramedConnection,
        permit: SessionPermit,
    ) {
        let mut session = Session::new(
            self.local_id.to_string(),
            remote_id.clone(),
            req.instance_id.clone(),
            self.config.clone(),
            Some(self.limits.create_stream_limits()),
        );
        if let Err(e) = session.server_handshake(&mut framed, &req, req_seq).await {
            warn!(remote = %remote_id, error = %e, "handshake rejected");
            return;
        }

        let (cmd_tx, cmd_rx) = mpsc::channel(256);
        let (conn_tx, conn_rx) = mpsc::channel(1);
        let handle = session.handle(cmd_tx.clone());

        self.sessions.insert(
            remote_id.clone(),
            LiveSession {
                instance_id: req.instance_id,
                conn_tx,
                cmd_tx,
            },
        );

        let dispatcher = self.dispatcher.clone();
        let sessions = Arc::clone(&self.sessions);
        tokio::spawn(async move {
            let _permit = permit;
            run_session(session, framed, cmd_rx, conn_rx, dispatcher, handle).await;
            sessions.remove(&remote_id);
        });
    }
}

async fn read_handshake_request(framed: &mut FramedConnection) -> Result<(String, HandshakeRequest, u64)> {
    let frame = framed
        .next()
        .await
        .ok_or(RiverError::UnexpectedDisconnect)?
        .map_err(|e| RiverError::ProtocolViolation(e.to_string()))?;
    let seq = frame.seq;
    match frame.payload {
        FramePayload::HandshakeRequest(req) => Ok((frame.from, req, seq)),
        _ => Err(RiverError::ProtocolViolation(
            "expected HANDSHAKE_REQ as first frame".into(),
        )),
    }
}

/// Drives one session through however many connect/disconnect/reconnect
/// cycles it lives through, dispatching newly opened streams through
/// `dispatcher`. Mirrors `TunnelServer::process_messages`'s per-connection
/// loop, generalized with the grace-window reconnect wait spec.md §4.3
/// requires (FerroTunnel tears a session down immediately on disconnect;
/// River gives the peer a chance to resume it).
async fn run_session(
    mut session: Session,
    mut framed: FramedConnection,
    mut cmd_rx: mpsc::Receiver<SessionCommand>,
    mut conn_rx: mpsc::Receiver<FramedConnection>,
    dispatcher: ServerDispatcher,
    handle: SessionHandle,
) {
    loop {
        let dispatcher = dispatcher.clone();
        let session_handle = handle.clone();
        let exit = session
            .run(framed, &mut cmd_rx, move |frame, registry| {
                let dispatcher = dispatcher.clone();
                let session_handle = session_handle.clone();
                async move {
                    dispatcher.handle_open(frame, registry, session_handle).await;
                }
            })
            .await;

        match exit {
            SessionExit::Shutdown | SessionExit::ProtocolViolation(_) => {
                session.teardown().await;
                return;
            }
            SessionExit::Disconnected => {
                info!(remote = %session.remote_id(), "connection lost, entering grace window");
            }
        }

        match tokio::time::timeout(session.grace(), conn_rx.recv()).await {
            Ok(Some(mut new_framed)) => {
                if session.replay(&mut new_framed, None).await.is_err() {
                    session.teardown().await;
                    return;
                }
                framed = new_framed;
            }
            _ => {
                warn!(remote = %session.remote_id(), "grace window elapsed, tearing down session");
                session.teardown().await;
                return;
            }
        }
    }
}
