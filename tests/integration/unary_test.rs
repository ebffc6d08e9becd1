//! `kv.set` end to end: spec.md §8 scenario 1 (unary rpc).

use crate::common::{connect_client, test_server};
use serde_json::json;

#[tokio::test]
async fn set_returns_the_stored_value() {
    let server = test_server("srv-unary");
    let (client, _sever) = connect_client(&server, "cli-unary", "srv-unary", "inst-1").await;

    let resp = client
        .dispatcher()
        .call_rpc("kv", "set", json!({"k": "color", "v": "blue"}))
        .await
        .expect("call_rpc failed");

    assert_eq!(resp, json!("blue"));
    client.shutdown().await;
}

#[tokio::test]
async fn set_without_required_field_returns_app_error() {
    let server = test_server("srv-unary-2");
    let (client, _sever) = connect_client(&server, "cli-unary-2", "srv-unary-2", "inst-1").await;

    let err = client
        .dispatcher()
        .call_rpc("kv", "set", json!({"k": "color"}))
        .await
        .expect_err("expected missing-field error");

    match err {
        river_common::RiverError::App(app) => assert_eq!(app.code, "BAD_REQUEST"),
        other => panic!("expected AppError, got {other:?}"),
    }
    client.shutdown().await;
}

#[tokio::test]
async fn unknown_procedure_fails_only_that_call() {
    let server = test_server("srv-unary-3");
    let (client, _sever) = connect_client(&server, "cli-unary-3", "srv-unary-3", "inst-1").await;

    let err = client
        .dispatcher()
        .call_rpc("kv", "delete", json!({"k": "color"}))
        .await
        .expect_err("expected NOT_IMPLEMENTED");
    match err {
        river_common::RiverError::App(app) => assert_eq!(app.code, "NOT_IMPLEMENTED"),
        other => panic!("expected AppError, got {other:?}"),
    }

    // the session itself is still usable for a subsequent, valid call.
    let resp = client
        .dispatcher()
        .call_rpc("kv", "set", json!({"k": "k2", "v": 42}))
        .await
        .expect("call_rpc failed after unrelated unknown-procedure error");
    assert_eq!(resp, json!(42));
    client.shutdown().await;
}
