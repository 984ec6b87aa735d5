// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A single long-lived connection to one worker's RPC socket. The worker serves exactly one concurrent connection, so the
//! supervisor multiplexes `watch`'s push stream and one-shot commands
//! (`input`, `resize`, `kill`, `remove`) over the same pair of halves: a
//! reader task demultiplexes incoming frames by shape (`op` -> reply to the
//! oldest pending request, `kind` -> unsolicited [`OutputEvent`]) rather than
//! by any id, since the worker always answers one-shot requests in the order
//! it received them.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use attn_wire::{HealthResult, HelloResult, InfoResult, OutputEvent, Request, Response, WireError, WireErrorCode};
use tokio::net::UnixStream;
use tokio::net::unix::OwnedWriteHalf;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;

use crate::error::DaemonError;

/// The RPC major version this supervisor was built against. Must match
/// `attn_worker::rpc::RPC_MAJOR`; a mismatch on `hello` is an `ErrUnsupportedVersion`.
pub const EXPECTED_RPC_MAJOR: u32 = 1;

pub struct WorkerClient {
    write_half: Arc<Mutex<OwnedWriteHalf>>,
    pending: Arc<Mutex<VecDeque<oneshot::Sender<Response>>>>,
    reader: JoinHandle<()>,
}

impl WorkerClient {
    /// Connect, perform `hello`, and spawn the reader task that will forward
    /// every subsequent `OutputEvent` onto `events_tx`. Returns the connected
    /// client plus the worker's `hello` reply.
    pub async fn connect(
        socket_path: &Path,
        daemon_instance_id: &str,
        control_token: &str,
        events_tx: mpsc::UnboundedSender<OutputEvent>,
    ) -> Result<(Self, HelloResult), DaemonError> {
        let stream = UnixStream::connect(socket_path)
            .await
            .map_err(|e| DaemonError::transient(format!("connect {}: {e}", socket_path.display())))?;
        let (mut read_half, write_half) = stream.into_split();
        let write_half = Arc::new(Mutex::new(write_half));
        let pending: Arc<Mutex<VecDeque<oneshot::Sender<Response>>>> = Arc::new(Mutex::new(VecDeque::new()));

        let reader_pending = Arc::clone(&pending);
        let reader = tokio::spawn(async move {
            loop {
                let value: serde_json::Value = match attn_wire::read_json(&mut read_half).await {
                    Ok(v) => v,
                    Err(_) => break,
                };
                if value.get("op").is_some() {
                    let Ok(resp) = serde_json::from_value::<Response>(value) else { continue };
                    if let Some(waiter) = reader_pending.lock().await.pop_front() {
                        let _ = waiter.send(resp);
                    }
                } else if value.get("kind").is_some() {
                    let Ok(event) = serde_json::from_value::<OutputEvent>(value) else { continue };
                    if events_tx.send(event).is_err() {
                        break;
                    }
                }
            }
            // Connection gone: nobody waiting on a reply will ever get one.
            reader_pending.lock().await.clear();
        });

        let client = Self { write_half, pending, reader };
        let reply = client
            .request(Request::Hello {
                daemon_instance_id: daemon_instance_id.to_owned(),
                control_token: control_token.to_owned(),
            })
            .await?;
        match reply {
            Response::Hello(result) => {
                if result.rpc_major != EXPECTED_RPC_MAJOR {
                    return Err(DaemonError::permanent(format!(
                        "worker rpc_major {} unsupported, expected {EXPECTED_RPC_MAJOR}",
                        result.rpc_major
                    )));
                }
                Ok((client, result))
            }
            Response::Error(err) => Err(map_wire_error(err)),
            _ => Err(DaemonError::permanent("unexpected reply to hello")),
        }
    }

    async fn request(&self, req: Request) -> Result<Response, DaemonError> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.push_back(tx);
        {
            let mut w = self.write_half.lock().await;
            attn_wire::write_json(&mut *w, &req)
                .await
                .map_err(|e| DaemonError::transient(format!("write failed: {e}")))?;
        }
        rx.await.map_err(|_| DaemonError::transient("worker connection closed before reply"))
    }

    pub async fn info(&self) -> Result<InfoResult, DaemonError> {
        match self.request(Request::Info).await? {
            Response::Info(info) => Ok(info),
            Response::Error(e) => Err(map_wire_error(e)),
            _ => Err(DaemonError::permanent("unexpected reply to info")),
        }
    }

    pub async fn health(&self) -> Result<HealthResult, DaemonError> {
        match self.request(Request::Health).await? {
            Response::Health(h) => Ok(h),
            Response::Error(e) => Err(map_wire_error(e)),
            _ => Err(DaemonError::permanent("unexpected reply to health")),
        }
    }

    /// Start (or restart, on reattach) the push stream of `OutputEvent`s from
    /// `from_seq`. Replies `Ack` immediately; events themselves arrive on the
    /// channel passed to [`connect`].
    pub async fn watch(&self, from_seq: Option<u64>) -> Result<(), DaemonError> {
        self.ack(Request::Watch { from_seq }).await
    }

    pub async fn input(&self, data: Vec<u8>) -> Result<(), DaemonError> {
        self.ack(Request::Input { data }).await
    }

    pub async fn resize(&self, cols: u16, rows: u16) -> Result<(), DaemonError> {
        self.ack(Request::Resize { cols, rows }).await
    }

    pub async fn kill(&self, signal: Option<i32>) -> Result<(), DaemonError> {
        self.ack(Request::Kill { signal }).await
    }

    pub async fn remove(&self) -> Result<(), DaemonError> {
        self.ack(Request::Remove).await
    }

    async fn ack(&self, req: Request) -> Result<(), DaemonError> {
        match self.request(req).await? {
            Response::Ack => Ok(()),
            Response::Error(e) => Err(map_wire_error(e)),
            _ => Err(DaemonError::permanent("unexpected reply, expected ack")),
        }
    }
}

impl Drop for WorkerClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

fn map_wire_error(err: WireError) -> DaemonError {
    match err.code {
        WireErrorCode::Unauthorized => DaemonError::unauthorized(err.message),
        WireErrorCode::UnsupportedVersion => DaemonError::permanent(err.message),
        WireErrorCode::BadRequest => DaemonError::validation(err.message),
        WireErrorCode::NotRunning => DaemonError::permanent(err.message),
        WireErrorCode::Internal => DaemonError::permanent(err.message),
    }
}
