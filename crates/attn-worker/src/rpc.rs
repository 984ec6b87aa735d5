// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The worker's length-prefixed JSON-RPC socket.
//!
//! Exactly one concurrent connection is served; a second connection while
//! one is active is refused outright. Within the one connection, `watch`
//! turns the write half into a push stream of [`OutputEvent`]s while the
//! read half keeps accepting one-shot requests (`input`, `resize`, `kill`,
//! ...), so a supervisor can resize a session mid-stream.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use attn_wire::{
    HealthResult, HelloResult, InfoResult, Request, Response, ScreenSnapshotWire, WireError,
    WireErrorCode,
};
use nix::sys::signal::Signal;
use tokio::io::AsyncWrite;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::session::Session;

pub const RPC_MAJOR: u32 = 1;
pub const RPC_MINOR: u32 = 0;
pub const WORKER_VERSION: &str = env!("CARGO_PKG_VERSION");

pub struct RpcServer {
    listener: UnixListener,
    busy: Arc<AtomicBool>,
}

impl RpcServer {
    pub fn bind(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let listener = UnixListener::bind(path)?;
        set_owner_only(path)?;
        Ok(Self { listener, busy: Arc::new(AtomicBool::new(false)) })
    }

    /// Accept and serve connections until `shutdown` is cancelled. Runs
    /// forever in practice: the worker process exits when its one session
    /// tears down, which cancels `shutdown` from the caller's side.
    pub async fn serve(
        &self,
        session: Arc<Session>,
        daemon_instance_id: String,
        control_token: String,
        shutdown: tokio_util::sync::CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                accepted = self.listener.accept() => {
                    let Ok((stream, _)) = accepted else { continue };
                    if self.busy.swap(true, Ordering::SeqCst) {
                        debug!("rejecting concurrent rpc connection");
                        drop(stream);
                        continue;
                    }
                    let session = Arc::clone(&session);
                    let daemon_instance_id = daemon_instance_id.clone();
                    let control_token = control_token.clone();
                    let conn_shutdown = shutdown.clone();
                    let busy = Arc::clone(&self.busy);
                    // `busy` is cleared once the connection task finishes, so
                    // a second connection is refused for its whole lifetime,
                    // not just the instant it was accepted.
                    tokio::spawn(async move {
                        serve_connection(stream, session, daemon_instance_id, control_token, conn_shutdown)
                            .await;
                        busy.store(false, Ordering::SeqCst);
                    });
                }
            }
        }
    }
}

#[cfg(unix)]
fn set_owner_only(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn set_owner_only(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

async fn serve_connection(
    stream: UnixStream,
    session: Arc<Session>,
    daemon_instance_id: String,
    control_token: String,
    shutdown: tokio_util::sync::CancellationToken,
) {
    let (mut read_half, write_half) = stream.into_split();
    let write_half = Arc::new(Mutex::new(write_half));
    let mut authenticated = false;
    let mut watch_task: Option<tokio::task::JoinHandle<()>> = None;

    loop {
        let req: Request = match attn_wire::read_json(&mut read_half).await {
            Ok(r) => r,
            Err(_) => break,
        };

        if !authenticated {
            match &req {
                Request::Hello { daemon_instance_id: got_id, control_token: got_token } => {
                    if got_id != &daemon_instance_id || got_token != &control_token {
                        let err = WireError::new(WireErrorCode::Unauthorized, "bad hello credentials");
                        let _ = send(&write_half, Response::Error(err)).await;
                        break;
                    }
                    authenticated = true;
                    let result = HelloResult {
                        worker_version: WORKER_VERSION.to_string(),
                        rpc_major: RPC_MAJOR,
                        rpc_minor: RPC_MINOR,
                        session_id: session.session_id.clone(),
                    };
                    if send(&write_half, Response::Hello(result)).await.is_err() {
                        break;
                    }
                    continue;
                }
                _ => {
                    let err = WireError::new(WireErrorCode::Unauthorized, "hello required first");
                    let _ = send(&write_half, Response::Error(err)).await;
                    break;
                }
            }
        }

        match req {
            Request::Hello { .. } => {
                // Re-hello on an already authenticated connection is accepted
                // idempotently rather than erroring.
                let result = HelloResult {
                    worker_version: WORKER_VERSION.to_string(),
                    rpc_major: RPC_MAJOR,
                    rpc_minor: RPC_MINOR,
                    session_id: session.session_id.clone(),
                };
                if send(&write_half, Response::Hello(result)).await.is_err() {
                    break;
                }
            }
            Request::Info => {
                let snapshot = session.screen_snapshot().await;
                let info = InfoResult {
                    running: session.is_running(),
                    agent: session.agent.clone(),
                    cwd: session.cwd.clone(),
                    cols: snapshot.cols,
                    rows: snapshot.rows,
                    worker_pid: session.worker_pid,
                    child_pid: Some(session.pty.child_pid()),
                    last_seq: session.ring.lock().await.last_seq(),
                    state: session.state(),
                    screen_snapshot: Some(ScreenSnapshotWire {
                        lines: snapshot.lines,
                        cols: snapshot.cols,
                        rows: snapshot.rows,
                        alt_screen: snapshot.alt_screen,
                        cursor_row: snapshot.cursor.row,
                        cursor_col: snapshot.cursor.col,
                    }),
                };
                if send(&write_half, Response::Info(info)).await.is_err() {
                    break;
                }
            }
            Request::Health => {
                let health = HealthResult { ok: true, running: session.is_running() };
                if send(&write_half, Response::Health(health)).await.is_err() {
                    break;
                }
            }
            Request::Watch { from_seq } => {
                if let Some(handle) = watch_task.take() {
                    handle.abort();
                }
                let session = Arc::clone(&session);
                let write_half = Arc::clone(&write_half);
                watch_task = Some(tokio::spawn(async move {
                    run_watch(session, write_half, from_seq).await;
                }));
            }
            Request::Input { data } => {
                let result = session.pty.write(&data).await;
                let resp =
                    if result.is_ok() { Response::Ack } else { internal_error("write failed") };
                if send(&write_half, resp).await.is_err() {
                    break;
                }
            }
            Request::Resize { cols, rows } => {
                let resp = match session.resize(cols, rows).await {
                    Ok(()) => Response::Ack,
                    Err(e) => internal_error(&e.to_string()),
                };
                if send(&write_half, resp).await.is_err() {
                    break;
                }
            }
            Request::Kill { signal } => {
                let sig = signal
                    .and_then(|n| Signal::try_from(n).ok())
                    .unwrap_or(Signal::SIGTERM);
                let resp = match session.signal(sig) {
                    Ok(()) => Response::Ack,
                    Err(e) => internal_error(&e.to_string()),
                };
                if send(&write_half, resp).await.is_err() {
                    break;
                }
            }
            Request::Remove => {
                let _ = send(&write_half, Response::Ack).await;
                info!(session_id = %session.session_id, "remove requested, shutting down worker");
                shutdown.cancel();
                break;
            }
        }
    }

    if let Some(handle) = watch_task {
        handle.abort();
    }
}

async fn run_watch(
    session: Arc<Session>,
    write_half: Arc<Mutex<impl AsyncWrite + Unpin>>,
    from_seq: Option<u64>,
) {
    let from_seq = from_seq.unwrap_or(0);
    let mut rx = session.events_tx.subscribe();

    let replay = {
        let ring = session.ring.lock().await;
        ring.replay_from(from_seq)
    };
    let Some(events) = replay else {
        let desync = attn_wire::OutputEvent::Desync {
            reason: format!("requested seq {from_seq} no longer held in replay buffer"),
        };
        let _ = send(&write_half, Response::Ack).await; // ack the watch request itself
        let _ = send_event(&write_half, &desync).await;
        return;
    };
    if send(&write_half, Response::Ack).await.is_err() {
        return;
    }
    for event in events {
        if send_event(&write_half, &event).await.is_err() {
            return;
        }
    }

    loop {
        match rx.recv().await {
            Ok(event) => {
                if event.seq().is_some_and(|s| s <= from_seq) {
                    continue;
                }
                if send_event(&write_half, &event).await.is_err() {
                    return;
                }
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {
                let desync =
                    attn_wire::OutputEvent::Desync { reason: "watch subscriber lagged".into() };
                let _ = send_event(&write_half, &desync).await;
                return;
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
        }
    }
}

async fn send(
    write_half: &Arc<Mutex<impl AsyncWrite + Unpin>>,
    response: Response,
) -> Result<(), attn_wire::ProtocolError> {
    let mut w = write_half.lock().await;
    attn_wire::write_json(&mut *w, &response).await
}

async fn send_event(
    write_half: &Arc<Mutex<impl AsyncWrite + Unpin>>,
    event: &attn_wire::OutputEvent,
) -> Result<(), attn_wire::ProtocolError> {
    let mut w = write_half.lock().await;
    attn_wire::write_json(&mut *w, event).await
}

fn internal_error(message: &str) -> Response {
    warn!(message, "rpc request failed");
    Response::Error(WireError::new(WireErrorCode::Internal, message))
}
