//! Multiple clients against one server: distinct remote ids get independent
//! sessions, and a reconnect with a different `instanceId` for the same
//! remote id evicts the old session (spec.md §4.3 last paragraph).

use crate::common::{connect_client, linked_connector, test_server, test_session_config};
use river_core::client::RiverClient;
use serde_json::json;

#[tokio::test]
async fn two_remote_ids_get_independent_sessions() {
    let server = test_server("srv-multi");
    let (alice, _) = connect_client(&server, "alice", "srv-multi", "inst-a").await;
    let (bob, _) = connect_client(&server, "bob", "srv-multi", "inst-b").await;

    alice
        .dispatcher()
        .call_rpc("kv", "set", json!({"k": "shared", "v": "from-alice"}))
        .await
        .expect("alice set failed");
    bob.dispatcher()
        .call_rpc("kv", "set", json!({"k": "shared", "v": "from-bob"}))
        .await
        .expect("bob set failed");

    assert_eq!(server.session_count(), 2);
    alice.shutdown().await;
    bob.shutdown().await;
}

#[tokio::test]
async fn reconnect_with_new_instance_id_replaces_old_session() {
    let server = test_server("srv-multi-2");

    let (connector, _sever) = linked_connector(server.clone());
    let first = RiverClient::connect(
        "carol",
        "srv-multi-2",
        "inst-1",
        test_session_config(),
        connector,
    )
    .await
    .expect("first connect failed");
    assert_eq!(server.session_count(), 1);

    // A brand new client identity (same remoteId "carol", different
    // instanceId) connects concurrently: per spec.md this evicts the first
    // session rather than resuming it.
    let (client2, _sever2) = connect_client(&server, "carol", "srv-multi-2", "inst-2").await;
    client2
        .dispatcher()
        .call_rpc("kv", "set", json!({"k": "who", "v": "second"}))
        .await
        .expect("second client's call failed");

    assert_eq!(server.session_count(), 1);

    // the evicted first session's handle is no longer backed by a live
    // session actor; calls through it now fail.
    let _ = first.shutdown().await;
}
