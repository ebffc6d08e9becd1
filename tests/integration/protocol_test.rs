//! Protocol-level behavior that doesn't fit the other scenario files:
//! cancellation-on-drop (spec.md §4.5) and a sanity check that the sequence
//! manager keeps a session healthy across many consecutive calls.

use crate::common::{connect_client, test_server};
use serde_json::json;

#[tokio::test]
async fn dropping_a_subscription_receiver_does_not_wedge_the_session() {
    let server = test_server("srv-proto");
    let (client, _sever) = connect_client(&server, "cli-proto", "srv-proto", "inst-1").await;
    let dispatcher = client.dispatcher();

    dispatcher
        .call_rpc("kv", "set", json!({"k": "topic", "v": "v1"}))
        .await
        .expect("seed set failed");

    let mut updates = dispatcher
        .call_subscription("kv", "watch", json!({"k": "topic"}))
        .await
        .expect("call_subscription failed");
    assert_eq!(updates.recv().await.unwrap().unwrap(), json!("v1"));

    // Abandon the subscription mid-stream (spec.md §4.5 cancellation path)
    // rather than draining it to its natural end.
    drop(updates);

    // Push another update past the now-dropped receiver so the forwarding
    // task notices the send failure and runs its cleanup.
    dispatcher
        .call_rpc("kv", "set", json!({"k": "topic", "v": "v2"}))
        .await
        .expect("set after cancellation failed");

    // The session itself must still be fully usable afterwards.
    let resp = dispatcher
        .call_rpc("kv", "set", json!({"k": "other", "v": "still-fine"}))
        .await
        .expect("call after cancellation failed");
    assert_eq!(resp, json!("still-fine"));

    client.shutdown().await;
}

#[tokio::test]
async fn many_consecutive_calls_keep_sequence_numbers_in_sync() {
    let server = test_server("srv-proto-2");
    let (client, _sever) = connect_client(&server, "cli-proto-2", "srv-proto-2", "inst-1").await;
    let dispatcher = client.dispatcher();

    for i in 0..50 {
        let resp = dispatcher
            .call_rpc("kv", "set", json!({"k": format!("k{i}"), "v": i}))
            .await
            .unwrap_or_else(|e| panic!("call {i} failed: {e}"));
        assert_eq!(resp, json!(i));
    }

    client.shutdown().await;
}
