// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Integration tests for the client hub: the `/healthz` companion endpoint
//! and the `/ws` upgrade (auth, `initial_state` snapshot, command replies).

use std::sync::Arc;
use std::time::Duration;

use attn_daemon::config::DaemonConfig;
use attn_daemon::protocol::{CommandEnvelope, Event};
use attn_daemon::transport::{build_router, HubState};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::Message as WsMessage;

fn test_config(auth_token: Option<&str>) -> DaemonConfig {
    DaemonConfig {
        host: "127.0.0.1".into(),
        port: 0,
        auth_token: auth_token.map(str::to_owned),
        data_root: None,
        worker_binary: "attn-worker".into(),
        github_token: None,
        poll_interval_ms: 60_000,
        spawn_timeout_ms: 3_000,
        poller_failure_threshold: 3,
        poller_unreachable_after_ms: 2_000,
        monitor_fast_timeout_ms: 1_000,
        monitor_fast_timeout_limit: 8,
        monitor_timeout_backoff_ms: 200,
        client_queue_capacity: 16,
        heartbeat_interval_ms: 30_000,
        command_reply_timeout_ms: 1_000,
    }
}

/// Spawns a router bound to an ephemeral loopback port, echoing
/// `Command::Snapshot` as an empty `InitialState` (no attention core
/// running behind it). Returns the base `ws://` url and the command
/// receiver so a test can drive fake replies.
async fn spawn_hub(config: DaemonConfig) -> (String, mpsc::UnboundedReceiver<CommandEnvelope>) {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (broadcast_tx, _) = broadcast::channel(64);
    let hub = Arc::new(HubState { cmd_tx, broadcast_tx, config });
    let router = build_router(hub);

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve");
    });

    (format!("ws://{addr}"), cmd_rx)
}

/// A stand-in attention core: answers every incoming command with
/// `Event::Ack` so the hub's reply/ordering machinery can be exercised
/// without a real `Core`.
fn spawn_fake_core(mut cmd_rx: mpsc::UnboundedReceiver<CommandEnvelope>) {
    tokio::spawn(async move {
        while let Some(envelope) = cmd_rx.recv().await {
            let _ = envelope.reply.send(Ok(Event::Ack));
        }
    });
}

#[tokio::test]
async fn healthz_reports_ok() {
    let (base, cmd_rx) = spawn_hub(test_config(Some("secret"))).await;
    spawn_fake_core(cmd_rx);

    let http_base = base.replacen("ws://", "http://", 1);
    let resp = reqwest::get(format!("{http_base}/healthz")).await.expect("get healthz");
    assert!(resp.status().is_success());
    let body: serde_json::Value = resp.json().await.expect("json body");
    assert_eq!(body["ok"], true);
}

#[tokio::test]
async fn ws_upgrade_rejects_missing_token() {
    let (base, cmd_rx) = spawn_hub(test_config(Some("secret"))).await;
    spawn_fake_core(cmd_rx);

    let err = tokio_tungstenite::connect_async(format!("{base}/ws")).await.unwrap_err();
    match err {
        tokio_tungstenite::tungstenite::Error::Http(resp) => {
            assert_eq!(resp.status(), 401);
        }
        other => panic!("expected an HTTP rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn ws_upgrade_accepts_matching_query_token_and_sends_snapshot() {
    let (base, cmd_rx) = spawn_hub(test_config(Some("secret"))).await;
    spawn_fake_core(cmd_rx);

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("{base}/ws?token=secret")).await.expect("connect");

    let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("no timeout")
        .expect("stream open")
        .expect("ws frame");
    let WsMessage::Text(text) = msg else { panic!("expected a text frame") };
    let event: serde_json::Value = serde_json::from_str(&text).expect("json event");
    assert_eq!(event["event"], "ack");
}

#[tokio::test]
async fn ws_command_reply_round_trips() {
    let (base, cmd_rx) = spawn_hub(test_config(Some("secret"))).await;
    spawn_fake_core(cmd_rx);

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("{base}/ws?token=secret")).await.expect("connect");
    // First frame is the initial_state snapshot reply.
    let _ = tokio::time::timeout(Duration::from_secs(2), ws.next()).await.expect("no timeout");

    ws.send(WsMessage::Text(r#"{"cmd":"query"}"#.into())).await.expect("send command");
    let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("no timeout")
        .expect("stream open")
        .expect("ws frame");
    let WsMessage::Text(text) = msg else { panic!("expected a text frame") };
    let event: serde_json::Value = serde_json::from_str(&text).expect("json event");
    assert_eq!(event["event"], "ack");
}
