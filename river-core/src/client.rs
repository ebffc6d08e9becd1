//! Top-level client: connects, handshakes, and drives one [`Session`]
//! through its full connect/reconnect-and-resume lifecycle, exposing a
//! [`ClientDispatcher`] that stays valid across reconnects.
//!
//! Grounded in `ferrotunnel-core::tunnel::client::TunnelClient::connect_and_run`
//! for the handshake-then-select-loop shape; the reconnect loop itself uses
//! `river-core::reconnect::{Backoff, BackoffConfig}` rather than FerroTunnel's
//! caller-driven retry, since spec.md §4.3 makes reconnect-and-resume part of
//! the transport's own contract rather than something application code drives.

use crate::dispatcher::client::ClientDispatcher;
use crate::reconnect::{Backoff, BackoffConfig};
use crate::session::{Session, SessionCommand, SessionConfig, SessionExit, SessionHandle};
use crate::transport::BoxedConnection;
use river_common::{Result, RiverError};
use river_protocol::codec::FrameCodec;
use river_protocol::frame::TransportFrame;
use std::future::Future;
use std::pin::Pin;
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tracing::{info, warn};

type FramedConnection = Framed<BoxedConnection, FrameCodec>;

/// Produces a fresh byte connection to the server, called once per
/// connect/reconnect attempt. Boxed so callers can connect over TCP,
/// WebSocket, or an in-memory duplex pair (tests) interchangeably.
pub type Connector =
    Box<dyn Fn() -> Pin<Box<dyn Future<Output = Result<BoxedConnection>> + Send>> + Send + Sync>;

/// A client-side session: the handshake has already completed and the
/// session's connect/reconnect loop is running in the background. Issue
/// calls through [`RiverClient::dispatcher`].
pub struct RiverClient {
    handle: SessionHandle,
    dispatcher: ClientDispatcher,
}

impl RiverClient {
    /// Connect to a server, perform the handshake, and spawn the background
    /// task that drives the session (including reconnect-and-resume) for as
    /// long as the returned handle lives.
    pub async fn connect(
        local_id: impl Into<String>,
        remote_id: impl Into<String>,
        instance_id: impl Into<String>,
        config: SessionConfig,
        connector: Connector,
    ) -> Result<Self> {
        let mut session = Session::new(local_id, remote_id, instance_id, config.clone(), None);

        let stream = connector().await?;
        let mut framed: FramedConnection = Framed::new(stream, FrameCodec::new());
        let status = session.client_handshake(&mut framed).await?;
        if !status.ok {
            return Err(RiverError::ProtocolViolation(
                status.reason.unwrap_or_else(|| "handshake rejected".into()),
            ));
        }

        let (cmd_tx, cmd_rx) = mpsc::channel(256);
        let handle = session.handle(cmd_tx);
        let dispatcher = ClientDispatcher::new(handle.clone());

        tokio::spawn(run_client_session(session, framed, cmd_rx, connector));

        Ok(Self { handle, dispatcher })
    }

    #[must_use]
    pub fn dispatcher(&self) -> &ClientDispatcher {
        &self.dispatcher
    }

    #[must_use]
    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    pub async fn shutdown(&self) {
        self.handle.shutdown().await;
    }
}

fn no_op_open(
    _frame: TransportFrame,
    _registry: &mut crate::registry::StreamRegistry,
) -> impl Future<Output = ()> {
    async {}
}

/// Drives the session through connect/disconnect/reconnect cycles until a
/// protocol violation, a deliberate shutdown, or a grace window that elapses
/// without a successful reconnect.
async fn run_client_session(
    mut session: Session,
    mut framed: FramedConnection,
    mut cmd_rx: mpsc::Receiver<SessionCommand>,
    connector: Connector,
) {
    let mut backoff = Backoff::new(BackoffConfig::default());

    loop {
        let exit = session.run(framed, &mut cmd_rx, no_op_open).await;

        match exit {
            SessionExit::Shutdown | SessionExit::ProtocolViolation(_) => {
                session.teardown().await;
                return;
            }
            SessionExit::Disconnected => {
                info!("connection lost, attempting to reconnect");
            }
        }

        let deadline = tokio::time::Instant::now() + session.grace();
        let mut reconnected = None;
        while tokio::time::Instant::now() < deadline {
            match connector().await {
                Ok(stream) => {
                    let mut new_framed: FramedConnection = Framed::new(stream, FrameCodec::new());
                    let handshake_ok = session
                        .client_handshake(&mut new_framed)
                        .await
                        .map(|status| status.ok)
                        .unwrap_or(false);
                    if handshake_ok && session.replay(&mut new_framed, None).await.is_ok() {
                        reconnected = Some(new_framed);
                        backoff.reset();
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "reconnect attempt failed");
                }
            }

            let now = tokio::time::Instant::now();
            let remaining = deadline.checked_duration_since(now).unwrap_or_default();
            if remaining.is_zero() {
                break;
            }
            tokio::time::sleep(backoff.next_delay().min(remaining)).await;
        }

        match reconnected {
            Some(new_framed) => framed = new_framed,
            None => {
                warn!("grace window elapsed without reconnect, tearing down session");
                session.teardown().await;
                return;
            }
        }
    }
}
