//! `kv.watch` end to end: spec.md §8 scenario 2 (subscription).

use crate::common::{connect_client, test_server};
use river_common::RiverError;
use serde_json::json;

#[tokio::test]
async fn watch_replays_current_value_then_streams_updates() {
    let server = test_server("srv-sub");
    let (client, _sever) = connect_client(&server, "cli-sub", "srv-sub", "inst-1").await;
    let dispatcher = client.dispatcher();

    dispatcher
        .call_rpc("kv", "set", json!({"k": "mode", "v": "auto"}))
        .await
        .expect("seed set failed");

    let mut updates = dispatcher
        .call_subscription("kv", "watch", json!({"k": "mode"}))
        .await
        .expect("call_subscription failed");

    let first = updates.recv().await.expect("channel closed early").expect("app error");
    assert_eq!(first, json!("auto"));

    dispatcher
        .call_rpc("kv", "set", json!({"k": "mode", "v": "manual"}))
        .await
        .expect("second set failed");

    let second = updates.recv().await.expect("channel closed early").expect("app error");
    assert_eq!(second, json!("manual"));
    client.shutdown().await;
}

#[tokio::test]
async fn watch_unset_key_returns_not_found() {
    let server = test_server("srv-sub-2");
    let (client, _sever) = connect_client(&server, "cli-sub-2", "srv-sub-2", "inst-1").await;

    let mut updates = client
        .dispatcher()
        .call_subscription("kv", "watch", json!({"k": "never-set"}))
        .await
        .expect("call_subscription failed");

    let item = updates.recv().await.expect("channel closed early");
    match item {
        Err(RiverError::App(app)) => assert_eq!(app.code, "NOT_FOUND"),
        other => panic!("expected NOT_FOUND app error, got {other:?}"),
    }
    client.shutdown().await;
}
