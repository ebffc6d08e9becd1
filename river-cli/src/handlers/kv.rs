//! `kv.set` / `kv.watch`: an in-memory key/value store with live updates.
//!
//! Grounded in `examples/original_source`'s key/value test service, which
//! pairs a plain map with a subscriber list so a `watch` can replay the
//! current value before switching to live updates (spec.md §8 scenario 2).

use async_trait::async_trait;
use river_common::AppError;
use river_core::handler::{HandlerContext, RpcHandler, SubscriptionHandler};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::{broadcast, mpsc};

/// Shared state behind both `kv` handlers: the current value per key, plus a
/// broadcast channel so every live `watch` observes every `set`.
pub struct KvStore {
    values: Mutex<HashMap<String, Value>>,
    updates: broadcast::Sender<(String, Value)>,
}

impl KvStore {
    #[must_use]
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
        // No subscribers is a normal, not an error, condition.
        let _ = self.updates.send((key, value));
    }
}

impl Default for KvStore {
    fn default() -> Self {
        Self::new()
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
    store: std::sync::Arc<KvStore>,
}

impl SetHandler {
    #[must_use]
    pub fn new(store: std::sync::Arc<KvStore>) -> Self {
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
    store: std::sync::Arc<KvStore>,
}

impl WatchHandler {
    #[must_use]
    pub fn new(store: std::sync::Arc<KvStore>) -> Self {
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
                    .send(Err(AppError::new(
                        "NOT_FOUND",
                        format!("no value set for key '{key}'"),
                    )))
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
