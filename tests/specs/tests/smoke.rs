// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end smoke tests against the real `attnd` binary: the health
//! endpoint, the WebSocket upgrade, and a round-tripped session spawn.

use std::time::Duration;

use attn_specs::AttndProcess;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

const TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::test]
async fn healthz_ok() -> anyhow::Result<()> {
    let attnd = AttndProcess::start()?;
    attnd.wait_healthy(TIMEOUT).await?;

    let resp: serde_json::Value = reqwest::get(format!("{}/healthz", attnd.base_url())).await?.json().await?;
    assert_eq!(resp["ok"], true);

    Ok(())
}

#[tokio::test]
async fn ws_handshake_sends_initial_state() -> anyhow::Result<()> {
    let attnd = AttndProcess::start()?;
    attnd.wait_healthy(TIMEOUT).await?;

    let (mut ws, _) = tokio_tungstenite::connect_async(attnd.ws_url()).await?;
    let msg = tokio::time::timeout(TIMEOUT, ws.next()).await?.ok_or_else(|| anyhow::anyhow!("ws stream ended"))??;
    let Message::Text(text) = msg else { anyhow::bail!("expected a text frame") };
    let event: serde_json::Value = serde_json::from_str(&text)?;

    assert_eq!(event["event"], "initial_state");
    assert_eq!(event["sessions"], serde_json::json!([]));
    assert_eq!(event["protocol_version"], 1);

    Ok(())
}

#[tokio::test]
async fn ws_spawn_session_round_trip() -> anyhow::Result<()> {
    let attnd = AttndProcess::start()?;
    attnd.wait_healthy(TIMEOUT).await?;

    let (mut ws, _) = tokio_tungstenite::connect_async(attnd.ws_url()).await?;
    // initial_state
    let _ = tokio::time::timeout(TIMEOUT, ws.next()).await?;

    let workdir = tempfile::tempdir()?;
    let spawn_cmd = serde_json::json!({
        "cmd": "spawn_session",
        "id": "smoke-session-1",
        "agent": "cat",
        "cwd": workdir.path().to_string_lossy(),
    });
    ws.send(Message::Text(spawn_cmd.to_string().into())).await?;

    let msg = tokio::time::timeout(TIMEOUT, ws.next()).await?.ok_or_else(|| anyhow::anyhow!("ws stream ended"))??;
    let Message::Text(text) = msg else { anyhow::bail!("expected a text frame") };
    let event: serde_json::Value = serde_json::from_str(&text)?;

    assert_eq!(event["event"], "spawn_result");
    assert_eq!(event["id"], "smoke-session-1");
    assert_eq!(event["ok"], true);

    Ok(())
}
