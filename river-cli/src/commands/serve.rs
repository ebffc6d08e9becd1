//! `river serve`: the reference server, exposing `kv.set`, `kv.watch`,
//! `repeat.echo`, and `upload.send` over plain TCP.

use crate::handlers::{echo::EchoHandler, kv::KvStore, upload::UploadConcatHandler};
use anyhow::Result;
use river_common::config::RiverConfig;
use river_core::dispatcher::server::ServerDispatcherBuilder;
use river_core::handler::HandlerEntry;
use river_core::resource_limits::ServerResourceLimits;
use river_core::server::RiverServer;
use river_core::session::SessionConfig;
use river_core::transport::tcp;
use river_protocol::frame::ProtocolVersion;
use river_protocol::validation::ValidationLimits;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

pub async fn run() -> Result<()> {
    let config = RiverConfig::from_env();
    let local_id = config
        .server_transport_id
        .clone()
        .unwrap_or_else(|| "server".to_string());

    let kv_store = Arc::new(KvStore::new());
    let dispatcher = ServerDispatcherBuilder::new()
        .register("kv", "set", HandlerEntry::Rpc(Arc::new(crate::handlers::kv::SetHandler::new(kv_store.clone()))))
        .register("kv", "watch", HandlerEntry::Subscription(Arc::new(crate::handlers::kv::WatchHandler::new(kv_store))))
        .register("repeat", "echo", HandlerEntry::Stream(Arc::new(EchoHandler)))
        .register("upload", "send", HandlerEntry::Upload(Arc::new(UploadConcatHandler)))
        .build();

    let session_config = SessionConfig {
        heartbeat_interval: config.heartbeat_interval,
        heartbeats_until_dead: config.heartbeats_until_dead,
        session_disconnect_grace: config.session_disconnect_grace,
        protocol_version: ProtocolVersion::V2,
        validation_limits: ValidationLimits::default(),
    };
    let limits = ServerResourceLimits::new(
        config.limits.max_sessions,
        config.limits.max_streams_per_session,
        config.limits.max_inflight_frames,
    );
    let server = RiverServer::new(local_id.clone(), dispatcher, session_config, limits);

    let addr: SocketAddr = ([0, 0, 0, 0], config.port).into();
    let listener = tcp::bind(addr).await?;
    info!(%local_id, %addr, "river server listening");

    loop {
        match tcp::accept(&listener).await {
            Ok((stream, peer)) => {
                let server = server.clone();
                tokio::spawn(async move {
                    server.accept_connection(Box::pin(stream)).await;
                });
                info!(%peer, "accepted connection");
            }
            Err(e) => warn!(error = %e, "failed to accept connection"),
        }
    }
}
