//! Shared test fixtures for the integration suite: the `kv`/`repeat`/
//! `upload` demonstration services (the same shapes `river-cli` registers,
//! rebuilt here since `river-cli` is a binary crate with no library surface
//! to depend on) and a severable in-memory byte connection that lets a test
//! simulate a dropped connection without a real socket.

use async_trait::async_trait;
use river_common::AppError;
use river_core::client::{Connector, RiverClient};
use river_core::dispatcher::server::{ServerDispatcher, ServerDispatcherBuilder};
use river_core::handler::{
    HandlerContext, HandlerEntry, RpcHandler, StreamHandler, SubscriptionHandler, UploadHandler,
};
use river_core::resource_limits::ServerResourceLimits;
use river_core::server::RiverServer;
use river_core::session::SessionConfig;
use river_core::transport::BoxedConnection;
use river_protocol::frame::ProtocolVersion;
use river_protocol::validation::ValidationLimits;
use serde_json::Value;
use std::collections::HashMap;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::{broadcast, mpsc};

/// Short heartbeat/grace so reconnect and liveness tests finish quickly.
pub fn test_session_config() -> SessionConfig {
    SessionConfig {
        heartbeat_interval: Duration::from_millis(40),
        heartbeats_until_dead: 3,
        session_disconnect_grace: Duration::from_millis(350),
        protocol_version: ProtocolVersion::V2,
        validation_limits: ValidationLimits::default(),
    }
}

// ---------------------------------------------------------------------
// kv.set / kv.watch — grounded in `examples/original_source`'s key/value
// test service, same shape as `river-cli::handlers::kv`.
// ---------------------------------------------------------------------

pub struct KvStore {
    values: Mutex<HashMap<String, Value>>,
    updates: broadcast::Sender<(String, Value)>,
}

impl KvStore {
    pub fn new() -> Self {
        let (updates, _) = broadcast::channel(1024);
        Self {
            values: Mutex::new(HashMap::new()),
            updates,
        }
    }

    fn get(&self, key: &str) -> Option<Value> {
        self.values.lock().unwrap_or_else(|p| p.into_inner()).get(key).cloned()
    }

    fn set(&self, key: String, value: Value) {
        self.values
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(key.clone(), value.clone());
        let _ = self.updates.send((key, value));
    }
}

fn require_key(request: &Value) -> Result<String, AppError> {
    request
        .get("k")
        .and_then(Value::as_str)
        .map(ToString::to_string)
        .ok_or_else(|| AppError::new("BAD_REQUEST", "missing field 'k'"))
}

pub struct SetHandler {
    store: Arc<KvStore>,
}

impl SetHandler {
    pub fn new(store: Arc<KvStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl RpcHandler for SetHandler {
    async fn call(&self, request: Value, _ctx: HandlerContext) -> Result<Value, AppError> {
        let key = require_key(&request)?;
        let value = request
            .get("v")
            .cloned()
            .ok_or_else(|| AppError::new("BAD_REQUEST", "missing field 'v'"))?;
        self.store.set(key, value.clone());
        Ok(value)
    }
}

pub struct WatchHandler {
    store: Arc<KvStore>,
}

impl WatchHandler {
    pub fn new(store: Arc<KvStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SubscriptionHandler for WatchHandler {
    async fn call(
        &self,
        request: Value,
        ctx: HandlerContext,
        output: mpsc::Sender<Result<Value, AppError>>,
    ) {
        let key = match require_key(&request) {
            Ok(k) => k,
            Err(e) => {
                let _ = output.send(Err(e)).await;
                return;
            }
        };

        let mut updates = self.store.updates.subscribe();
        match self.store.get(&key) {
            Some(current) => {
                if output.send(Ok(current)).await.is_err() {
                    return;
                }
            }
            None => {
                let _ = output
                    .send(Err(AppError::new("NOT_FOUND", format!("no value set for key '{key}'"))))
                    .await;
                return;
            }
        }

        loop {
            tokio::select! {
                _ = ctx.aborted() => return,
                msg = updates.recv() => match msg {
                    Ok((k, v)) if k == key => {
                        if output.send(Ok(v)).await.is_err() {
                            return;
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        }
    }
}

// ---------------------------------------------------------------------
// repeat.echo — bidi stream that emits back whatever it receives.
// ---------------------------------------------------------------------

pub struct EchoHandler;

#[async_trait]
impl StreamHandler for EchoHandler {
    async fn call(
        &self,
        mut input: mpsc::Receiver<Value>,
        ctx: HandlerContext,
        output: mpsc::Sender<Result<Value, AppError>>,
    ) {
        loop {
            tokio::select! {
                _ = ctx.aborted() => return,
                item = input.recv() => match item {
                    Some(value) => {
                        if output.send(Ok(value)).await.is_err() {
                            return;
                        }
                    }
                    None => return,
                }
            }
        }
    }
}

// ---------------------------------------------------------------------
// upload.send — concatenates string parts from a client-streamed upload.
// ---------------------------------------------------------------------

pub struct UploadConcatHandler;

#[async_trait]
impl UploadHandler for UploadConcatHandler {
    async fn call(&self, mut input: mpsc::Receiver<Value>, _ctx: HandlerContext) -> Result<Value, AppError> {
        let mut buf = String::new();
        while let Some(item) = input.recv().await {
            let part = item
                .get("part")
                .and_then(Value::as_str)
                .ok_or_else(|| AppError::new("BAD_REQUEST", "missing field 'part'"))?;
            buf.push_str(part);
        }
        Ok(Value::String(buf))
    }
}

/// Builds the standard `kv`/`repeat`/`upload` handler table plus a handle to
/// the backing `KvStore` for assertions that peek at server-side state.
pub fn test_dispatcher() -> (ServerDispatcher, Arc<KvStore>) {
    let kv_store = Arc::new(KvStore::new());
    let dispatcher = ServerDispatcherBuilder::new()
        .register("kv", "set", HandlerEntry::Rpc(Arc::new(SetHandler::new(kv_store.clone()))))
        .register(
            "kv",
            "watch",
            HandlerEntry::Subscription(Arc::new(WatchHandler::new(kv_store.clone()))),
        )
        .register("repeat", "echo", HandlerEntry::Stream(Arc::new(EchoHandler)))
        .register("upload", "send", HandlerEntry::Upload(Arc::new(UploadConcatHandler)))
        .build();
    (dispatcher, kv_store)
}

pub fn test_server(local_id: &str) -> RiverServer {
    RiverServer::new(
        local_id,
        test_dispatcher().0,
        test_session_config(),
        ServerResourceLimits::new(100, 100, 100),
    )
}

// ---------------------------------------------------------------------
// Severable in-memory byte connection: lets a test simulate a dropped
// connection (spec.md §8 scenario 6) without a real socket. Reads return
// EOF and writes return `BrokenPipe` once severed, mirroring what a
// severed TCP/WebSocket connection looks like to the session actor.
// ---------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct Severable(Arc<AtomicBool>);

impl Severable {
    pub fn sever(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

struct SeveredStream<T> {
    inner: T,
    flag: Arc<AtomicBool>,
}

impl<T> SeveredStream<T> {
    fn new(inner: T, flag: Arc<AtomicBool>) -> Self {
        Self { inner, flag }
    }

    fn severed(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

impl<T: AsyncRead + Unpin> AsyncRead for SeveredStream<T> {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        if self.severed() {
            return Poll::Ready(Ok(()));
        }
        let this = self.get_mut();
        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

impl<T: AsyncWrite + Unpin> AsyncWrite for SeveredStream<T> {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, data: &[u8]) -> Poll<io::Result<usize>> {
        if self.severed() {
            return Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "severed")));
        }
        let this = self.get_mut();
        Pin::new(&mut this.inner).poll_write(cx, data)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if self.severed() {
            return Poll::Ready(Ok(()));
        }
        let this = self.get_mut();
        Pin::new(&mut this.inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        Pin::new(&mut this.inner).poll_shutdown(cx)
    }
}

/// Build one severable in-memory duplex pair, boxed as [`BoxedConnection`]s
/// on both ends, plus the handle that severs it. Used directly by tests that
/// need to control exactly when (and whether) a connection comes back, as
/// opposed to [`linked_connector`]'s "always succeeds with a fresh pair"
/// behavior.
pub fn severable_duplex() -> (BoxedConnection, BoxedConnection, Severable) {
    let (client_half, server_half) = tokio::io::duplex(64 * 1024);
    let severable = Severable::default();
    let client_conn: BoxedConnection = Box::pin(SeveredStream::new(client_half, severable.0.clone()));
    let server_conn: BoxedConnection = Box::pin(SeveredStream::new(server_half, severable.0.clone()));
    (client_conn, server_conn, severable)
}

/// Wires a client connector to a server without a socket: each connector
/// invocation opens a fresh in-memory duplex pair and immediately hands the
/// server half to `server.accept_connection`, the way a real accept loop
/// would for a freshly arrived TCP connection. Returns the connector plus a
/// handle that severs whichever connection is currently active, so a test
/// can drive a disconnect/reconnect cycle.
pub fn linked_connector(server: RiverServer) -> (Connector, Arc<Mutex<Option<Severable>>>) {
    let current: Arc<Mutex<Option<Severable>>> = Arc::new(Mutex::new(None));
    let current_for_closure = Arc::clone(&current);
    let connector: Connector = Box::new(move || {
        let server = server.clone();
        let current = Arc::clone(&current_for_closure);
        Box::pin(async move {
            let (client_half, server_half) = tokio::io::duplex(64 * 1024);
            let severable = Severable::default();
            *current.lock().unwrap() = Some(severable.clone());

            let server_conn: BoxedConnection = Box::pin(SeveredStream::new(server_half, severable.0.clone()));
            let server_for_accept = server.clone();
            tokio::spawn(async move {
                server_for_accept.accept_connection(server_conn).await;
            });

            let client_conn: BoxedConnection = Box::pin(SeveredStream::new(client_half, severable.0));
            Ok(client_conn)
        })
    });
    (connector, current)
}

/// Connect a fresh client to `server`, returning the client plus a handle
/// that can sever its current underlying connection.
pub async fn connect_client(
    server: &RiverServer,
    local_id: &str,
    remote_id: &str,
    instance_id: &str,
) -> (RiverClient, Arc<Mutex<Option<Severable>>>) {
    let (connector, sever_slot) = linked_connector(server.clone());
    let client = RiverClient::connect(local_id, remote_id, instance_id, test_session_config(), connector)
        .await
        .expect("client connect failed");
    (client, sever_slot)
}

pub fn sever(slot: &Arc<Mutex<Option<Severable>>>) {
    if let Some(s) = slot.lock().unwrap().clone() {
        s.sever();
    }
}
