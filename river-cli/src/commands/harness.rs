//! `river harness`: reads newline-delimited JSON action objects from stdin
//! and drives them through a [`RiverClient`], per spec.md §6/§8.
//!
//! Action shape: `{id, proc, init?, payload?}`. The first action seen for a
//! given `id` opens a call, dispatched by its `proc`; any later action
//! carrying the same `id` is a continuation regardless of whether it repeats
//! `proc` (see DESIGN.md's harness continuation-rule decision, which resolves
//! spec.md §8 scenarios 4 and 5 disagreeing on whether `proc` is repeated).

use anyhow::{Context, Result};
use river_common::config::RiverConfig;
use river_common::RiverError;
use river_core::client::RiverClient;
use river_core::dispatcher::client::ClientDispatcher;
use river_core::session::SessionConfig;
use river_core::transport::tcp;
use river_protocol::frame::ProtocolVersion;
use river_protocol::validation::ValidationLimits;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
struct Action {
    id: String,
    #[serde(rename = "proc")]
    procedure: Option<String>,
    init: Option<Value>,
    payload: Option<Value>,
}

/// An action whose payload is the harness-level end-of-input sentinel
/// (spec.md §6): the bare string `"EOF"`, or an object carrying it in one of
/// its fields (scenario 4 sends `{"part":"EOF"}` rather than a bare sentinel).
fn is_eof_sentinel(value: &Value) -> bool {
    match value {
        Value::String(s) => s == "EOF",
        Value::Object(map) => map.values().any(|v| matches!(v, Value::String(s) if s == "EOF")),
        _ => false,
    }
}

fn error_code(err: &RiverError) -> &str {
    match err {
        RiverError::App(app) => app.code.as_str(),
        RiverError::StreamClosed(_) => "STREAM_CLOSED",
        RiverError::UnexpectedDisconnect => "UNEXPECTED_DISCONNECT",
        RiverError::ProtocolViolation(_) => "PROTOCOL_VIOLATION",
        RiverError::SessionNotFound(_) => "SESSION_NOT_FOUND",
        RiverError::StreamNotFound(_) => "STREAM_NOT_FOUND",
        RiverError::Io(_) => "IO_ERROR",
        RiverError::Serialization(_) => "SERIALIZATION_ERROR",
        RiverError::Config(_) => "CONFIG_ERROR",
    }
}

/// Render a result value the way spec.md §8's scenarios print it: strings
/// unquoted, everything else as compact JSON.
fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn print_ok(id: &str, value: &Value) {
    println!("{id} -- ok:{}", display_value(value));
}

fn print_err(id: &str, err: &RiverError) {
    println!("{id} -- err:{}", error_code(err));
}

/// Continuation channel for an in-flight upload/stream call.
enum OpenCall {
    Streaming(mpsc::Sender<Value>),
}

pub async fn run() -> Result<()> {
    let config = RiverConfig::from_env();
    let local_id = config
        .client_transport_id
        .clone()
        .unwrap_or_else(|| "client".to_string());
    let remote_id = config
        .server_transport_id
        .clone()
        .unwrap_or_else(|| "server".to_string());
    let host = config.river_server.clone().unwrap_or_else(|| "127.0.0.1".to_string());
    let port = config.port;
    let instance_id = Uuid::new_v4().to_string();

    let session_config = SessionConfig {
        heartbeat_interval: config.heartbeat_interval,
        heartbeats_until_dead: config.heartbeats_until_dead,
        session_disconnect_grace: config.session_disconnect_grace,
        protocol_version: ProtocolVersion::V2,
        validation_limits: ValidationLimits::default(),
    };

    let connector: river_core::client::Connector = Box::new(move || {
        let host = host.clone();
        Box::pin(async move {
            let addr = tokio::net::lookup_host((host.as_str(), port))
                .await?
                .next()
                .ok_or_else(|| {
                    river_common::RiverError::Config(format!("could not resolve {host}:{port}"))
                })?;
            let stream = tcp::connect(addr).await?;
            let boxed: river_core::transport::BoxedConnection = Box::pin(stream);
            Ok(boxed)
        })
    });

    let client = RiverClient::connect(local_id, remote_id, instance_id, session_config, connector)
        .await
        .context("failed to connect to river server")?;
    let dispatcher = Arc::new(ClientDispatcher::new(client.handle().clone()));

    let mut open_calls: HashMap<String, OpenCall> = HashMap::new();
    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let action: Action = match serde_json::from_str(line) {
            Ok(a) => a,
            Err(e) => {
                tracing::warn!(error = %e, %line, "dropping malformed action");
                continue;
            }
        };

        if let Some(call) = open_calls.get(&action.id) {
            handle_continuation(&action, call, &mut open_calls);
            continue;
        }

        let Some(procedure) = action.procedure.clone() else {
            tracing::warn!(id = %action.id, "continuation for unknown id, dropping");
            continue;
        };
        let Some((service, method)) = procedure.split_once('.') else {
            println!("{} -- err:BAD_REQUEST", action.id);
            continue;
        };

        dispatch_open(service, method, action, &dispatcher, &mut open_calls).await;
    }

    client.shutdown().await;
    Ok(())
}

fn handle_continuation(action: &Action, call: &OpenCall, open_calls: &mut HashMap<String, OpenCall>) {
    let payload = action.payload.clone().unwrap_or(Value::Null);
    let OpenCall::Streaming(tx) = call;
    if is_eof_sentinel(&payload) {
        open_calls.remove(&action.id);
        return;
    }
    let tx = tx.clone();
    tokio::spawn(async move {
        let _ = tx.send(payload).await;
    });
}

async fn dispatch_open(
    service: &str,
    method: &str,
    action: Action,
    dispatcher: &Arc<ClientDispatcher>,
    open_calls: &mut HashMap<String, OpenCall>,
) {
    let id = action.id.clone();
    // `init` seeds a call's OPEN frame for kv.set/kv.watch, which have no
    // separate data stream to conflate it with. For repeat.echo/upload.send
    // it must stay out of the queued data items (spec.md §8 scenario 5):
    // only a real `payload` becomes the first queued item there.
    let request = action.payload.clone().or_else(|| action.init.clone()).unwrap_or(Value::Null);

    match (service, method) {
        ("kv", "set") => {
            let dispatcher = Arc::clone(dispatcher);
            tokio::spawn(async move {
                match dispatcher.call_rpc("kv", "set", request).await {
                    Ok(value) => print_ok(&id, &value),
                    Err(e) => print_err(&id, &e),
                }
            });
        }
        ("kv", "watch") => {
            let dispatcher = Arc::clone(dispatcher);
            tokio::spawn(async move {
                match dispatcher.call_subscription("kv", "watch", request).await {
                    Ok(mut rx) => {
                        while let Some(item) = rx.recv().await {
                            match item {
                                Ok(value) => print_ok(&id, &value),
                                Err(e) => print_err(&id, &e),
                            }
                        }
                    }
                    Err(e) => print_err(&id, &e),
                }
            });
        }
        ("repeat", "echo") => {
            let (tx, rx) = mpsc::channel(1024);
            if let Some(payload) = action.payload.clone() {
                let _ = tx.send(payload).await;
            }
            open_calls.insert(id.clone(), OpenCall::Streaming(tx));
            let dispatcher = Arc::clone(dispatcher);
            tokio::spawn(async move {
                match dispatcher.call_stream("repeat", "echo", rx).await {
                    Ok(mut out_rx) => {
                        while let Some(item) = out_rx.recv().await {
                            match item {
                                Ok(value) => print_ok(&id, &value),
                                Err(e) => print_err(&id, &e),
                            }
                        }
                    }
                    Err(e) => print_err(&id, &e),
                }
            });
        }
        ("upload", "send") => {
            let (tx, rx) = mpsc::channel(1024);
            if let Some(payload) = action.payload.clone() {
                let _ = tx.send(payload).await;
            }
            open_calls.insert(id.clone(), OpenCall::Streaming(tx));
            let dispatcher = Arc::clone(dispatcher);
            tokio::spawn(async move {
                match dispatcher.call_upload("upload", "send", rx).await {
                    Ok(value) => print_ok(&id, &value),
                    Err(e) => print_err(&id, &e),
                }
            });
        }
        _ => {
            println!("{id} -- err:NOT_IMPLEMENTED");
        }
    }
}
