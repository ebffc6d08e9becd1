//! Reconnect-and-resume: spec.md §4.3/§8 scenario 6. A severed connection
//! within the grace window resumes the same session and in-flight calls keep
//! working; a severed connection that never reconnects within the grace
//! window fails in-flight calls with `UNEXPECTED_DISCONNECT`.

use crate::common::{connect_client, sever, severable_duplex, test_dispatcher, test_server, test_session_config};
use river_common::RiverError;
use river_core::client::RiverClient;
use river_core::resource_limits::ServerResourceLimits;
use river_core::server::RiverServer;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, Duration};

#[tokio::test]
async fn sever_and_reattach_within_grace_window_preserves_in_flight_watch() {
    let server = test_server("srv-reconnect");
    let (client, sever_slot) = connect_client(&server, "cli-reconnect", "srv-reconnect", "inst-1").await;
    let dispatcher = client.dispatcher();

    dispatcher
        .call_rpc("kv", "set", json!({"k": "status", "v": "green"}))
        .await
        .expect("seed set failed");

    let mut updates = dispatcher
        .call_subscription("kv", "watch", json!({"k": "status"}))
        .await
        .expect("call_subscription failed");
    assert_eq!(updates.recv().await.unwrap().unwrap(), json!("green"));

    sever(&sever_slot);
    // give the heartbeat-miss detector and the automatic reconnect loop time
    // to notice the break and re-establish a fresh duplex pair.
    sleep(Duration::from_millis(250)).await;

    dispatcher
        .call_rpc("kv", "set", json!({"k": "status", "v": "red"}))
        .await
        .expect("post-reconnect set failed");

    let update = tokio::time::timeout(Duration::from_secs(2), updates.recv())
        .await
        .expect("timed out waiting for post-reconnect update")
        .expect("watch channel closed")
        .expect("app error");
    assert_eq!(update, json!("red"));

    client.shutdown().await;
}

#[tokio::test]
async fn grace_window_expiry_fails_in_flight_call_with_unexpected_disconnect() {
    let server = RiverServer::new(
        "srv-grace",
        test_dispatcher().0,
        test_session_config(),
        ServerResourceLimits::new(10, 10, 10),
    );

    // The first connector call hands back a severable duplex pair so the
    // test can sever it on demand; every later call fails outright,
    // simulating a peer that never comes back within the grace window.
    let (first_client_conn, first_server_conn, severable) = severable_duplex();
    let first_client_conn = Arc::new(std::sync::Mutex::new(Some(first_client_conn)));
    let first_server_conn = Arc::new(std::sync::Mutex::new(Some(first_server_conn)));

    let attempts = Arc::new(AtomicUsize::new(0));
    let server_for_connector = server.clone();
    let connector: river_core::client::Connector = Box::new(move || {
        let attempts = Arc::clone(&attempts);
        let server = server_for_connector.clone();
        let first_client_conn = Arc::clone(&first_client_conn);
        Box::pin(async move {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                let client_conn = first_client_conn.lock().unwrap().take().unwrap();
                Ok(client_conn)
            } else {
                Err(RiverError::Io(std::io::Error::other("network unreachable")))
            }
        })
    });

    let server_conn = first_server_conn.lock().unwrap().take().unwrap();
    tokio::spawn(async move {
        server.accept_connection(server_conn).await;
    });

    let client = RiverClient::connect(
        "cli-grace",
        "srv-grace",
        "inst-1",
        test_session_config(),
        connector,
    )
    .await
    .expect("initial connect failed");

    let mut pending = client
        .dispatcher()
        .call_subscription("kv", "watch", json!({"k": "never-set"}))
        .await
        .expect("call_subscription failed");
    let first = pending.recv().await.expect("channel closed early");
    assert!(matches!(first, Err(RiverError::App(ref app)) if app.code == "NOT_FOUND"));

    severable.sever();

    // heartbeats lapse (3 misses * 40ms) well before the 350ms grace window
    // elapses, so teardown should have run by the time we check.
    sleep(Duration::from_millis(800)).await;

    let err = client
        .dispatcher()
        .call_rpc("kv", "set", json!({"k": "x", "v": 1}))
        .await
        .expect_err("expected failure after grace window expiry");
    assert!(matches!(err, RiverError::UnexpectedDisconnect));
}
