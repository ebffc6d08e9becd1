//! `upload.send`: concatenates string parts from a client-streamed upload
//! (spec.md §8 scenario 4).
//!
//! The `"EOF"` sentinel that ends the upload is stripped out by the harness
//! client before it ever reaches this handler (see
//! `commands::harness::is_eof_sentinel`), so this handler only ever sees real
//! parts.

use async_trait::async_trait;
use river_common::AppError;
use river_core::handler::{HandlerContext, UploadHandler};
use serde_json::Value;
use tokio::sync::mpsc;

pub struct UploadConcatHandler;

#[async_trait]
impl UploadHandler for UploadConcatHandler {
    async fn call(
        &self,
        mut input: mpsc::Receiver<Value>,
        _ctx: HandlerContext,
    ) -> Result<Value, AppError> {
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
