// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ties together PTY spawn, registry write, RPC serving, and the exit
//! grace window into the worker's top-level run loop.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::WorkerConfig;
use crate::pty::PtySession;
use crate::registry;
use crate::rpc::RpcServer;
use crate::session::Session;

/// How often the classifier is re-evaluated against the clock even with no
/// new bytes, to catch the idle decay.
const TICK_INTERVAL: Duration = Duration::from_millis(1_000);

pub async fn run(config: WorkerConfig) -> anyhow::Result<i32> {
    let command = config.resolved_command();
    let pty = PtySession::spawn(&command, &config.cwd, config.cols, config.rows)?;
    let child_pid = pty.child_pid();

    registry::write_registry(
        &config.registry_path,
        &config.socket_path,
        &config.session_id,
        &config.daemon_instance_id,
        &config.control_token,
        &config.agent,
        &config.cwd,
        std::process::id(),
        Some(child_pid),
    )?;

    let session = Session::new(
        config.session_id.clone(),
        config.agent.clone(),
        &config.cwd,
        pty,
        config.cols,
        config.rows,
        config.replay_capacity,
    )?;

    let rpc_server = RpcServer::bind(&config.socket_path)?;
    let shutdown = CancellationToken::new();

    let rpc_shutdown = shutdown.clone();
    let rpc_session = Arc::clone(&session);
    let daemon_instance_id = config.daemon_instance_id.clone();
    let control_token = config.control_token.clone();
    let rpc_handle = tokio::spawn(async move {
        rpc_server.serve(rpc_session, daemon_instance_id, control_token, rpc_shutdown).await;
    });

    let tick_session = Arc::clone(&session);
    let tick_shutdown = shutdown.clone();
    let tick_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(TICK_INTERVAL);
        loop {
            tokio::select! {
                _ = tick_shutdown.cancelled() => return,
                _ = interval.tick() => tick_session.on_tick().await,
            }
        }
    });

    let exit_status = pump_output(Arc::clone(&session)).await;
    session.on_exit(exit_status.code, exit_status.signal).await;
    info!(
        session_id = %config.session_id,
        code = ?exit_status.code,
        signal = ?exit_status.signal,
        "child exited, entering exit grace window"
    );

    tokio::time::sleep(Duration::from_millis(config.exit_grace_ms)).await;

    shutdown.cancel();
    tick_handle.abort();
    let _ = rpc_handle.await;

    let _ = std::fs::remove_file(&config.socket_path);
    registry::remove_registry(&config.registry_path);

    Ok(exit_status.code.unwrap_or(if exit_status.signal.is_some() { 128 } else { 0 }))
}

/// Read PTY output until EOF, feeding every chunk through the classifier
/// and broadcasting it, then reap the child on a blocking thread.
async fn pump_output(session: Arc<Session>) -> crate::pty::ExitStatus {
    let mut buf = vec![0u8; 8192];
    loop {
        match session.pty.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => session.on_output(&buf[..n]).await,
            Err(e) => {
                warn!(err = %e, "pty read failed");
                break;
            }
        }
    }

    if let Ok(Some(status)) = session.pty.try_wait() {
        return status;
    }

    // Reap on a blocking thread so a child that's slow to actually exit
    // (signal delivered but not yet reaped) doesn't stall the runtime.
    let blocking_session = Arc::clone(&session);
    tokio::task::spawn_blocking(move || blocking_session.pty.wait_blocking())
        .await
        .unwrap_or(Ok(crate::pty::ExitStatus { code: None, signal: None }))
        .unwrap_or(crate::pty::ExitStatus { code: None, signal: None })
}
