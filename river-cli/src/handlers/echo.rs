//! `repeat.echo`: a bidi stream that emits back whatever it receives
//! (spec.md §8 scenario 5).

use async_trait::async_trait;
use river_common::AppError;
use river_core::handler::{HandlerContext, StreamHandler};
use serde_json::Value;
use tokio::sync::mpsc;

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
