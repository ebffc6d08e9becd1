//! `repeat.echo` end to end: spec.md §8 scenario 5 (bidi stream).

use crate::common::{connect_client, test_server};
use serde_json::json;
use tokio::sync::mpsc;

#[tokio::test]
async fn echo_returns_each_item_sent_in_order() {
    let server = test_server("srv-stream");
    let (client, _sever) = connect_client(&server, "cli-stream", "srv-stream", "inst-1").await;

    let (tx, rx) = mpsc::channel(8);
    let mut responses = client
        .dispatcher()
        .call_stream("repeat", "echo", rx)
        .await
        .expect("call_stream failed");

    tx.send(json!(1)).await.unwrap();
    assert_eq!(responses.recv().await.unwrap().unwrap(), json!(1));

    tx.send(json!("two")).await.unwrap();
    assert_eq!(responses.recv().await.unwrap().unwrap(), json!("two"));

    drop(tx);
    assert!(responses.recv().await.is_none());
    client.shutdown().await;
}
