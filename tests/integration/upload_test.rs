//! `upload.send` end to end: spec.md §8 scenario 4 (upload).

use crate::common::{connect_client, test_server};
use serde_json::json;
use tokio::sync::mpsc;

#[tokio::test]
async fn upload_concatenates_parts_and_returns_one_response() {
    let server = test_server("srv-upload");
    let (client, _sever) = connect_client(&server, "cli-upload", "srv-upload", "inst-1").await;

    let (tx, rx) = mpsc::channel(8);
    tx.send(json!({"part": "hel"})).await.unwrap();
    tx.send(json!({"part": "lo "})).await.unwrap();
    tx.send(json!({"part": "world"})).await.unwrap();
    drop(tx);

    let resp = client
        .dispatcher()
        .call_upload("upload", "send", rx)
        .await
        .expect("call_upload failed");

    assert_eq!(resp, json!("hello world"));
    client.shutdown().await;
}

#[tokio::test]
async fn upload_with_no_parts_returns_empty_string() {
    let server = test_server("srv-upload-2");
    let (client, _sever) = connect_client(&server, "cli-upload-2", "srv-upload-2", "inst-1").await;

    let (tx, rx) = mpsc::channel(1);
    drop(tx);

    let resp = client
        .dispatcher()
        .call_upload("upload", "send", rx)
        .await
        .expect("call_upload failed");

    assert_eq!(resp, json!(""));
    client.shutdown().await;
}
