// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recovery pass run once at daemon start: reconcile the
//! on-disk registry directory with the in-memory worker map, reclaiming
//! entries left behind by a dead daemon and reinstating live ones left by a
//! clean restart of this same daemon.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64};
use std::sync::Arc;

use attn_wire::registry::RegistryEntry;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{owns_socket_path, quarantine_file, monitor, Supervisor, WorkerClient, WorkerHandle};
use crate::protocol::CoreEvent;

pub async fn recover(sup: &Arc<Supervisor>) -> std::io::Result<()> {
    let dir = match std::fs::read_dir(&sup.registry_dir) {
        Ok(d) => d,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };

    for entry in dir {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        recover_one(sup, &path).await;
    }
    Ok(())
}

async fn recover_one(sup: &Arc<Supervisor>, path: &Path) {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            warn!(err = %e, path = %path.display(), "cannot read registry file");
            return;
        }
    };

    let entry: RegistryEntry = match attn_wire::registry::parse(&bytes) {
        Ok(e) => e,
        Err(_) => {
            quarantine_file(&sup.quarantine_dir, path, "malformed");
            return;
        }
    };

    if sup.workers.read().await.contains_key(&entry.session_id) {
        // Already reinstated by an earlier pass over the same directory;
        // recovery must be idempotent (spec property 4).
        return;
    }

    if entry.daemon_instance_id != sup.daemon_instance_id {
        reconcile_foreign_entry(sup, path, &entry).await;
        return;
    }

    if !owns_socket_path(&sup.sockets_dir, &entry.socket_path) {
        quarantine_file(&sup.quarantine_dir, path, "socket_path_mismatch");
        return;
    }

    reinstate(sup, path, entry).await;
}

/// An entry left by a different daemon instance: reclaim it if that instance
/// is dead, otherwise leave it strictly alone (spec property 5).
async fn reconcile_foreign_entry(sup: &Arc<Supervisor>, path: &Path, entry: &RegistryEntry) {
    if process_alive(entry.owner_pid, entry.owner_started_at) {
        quarantine_file(&sup.quarantine_dir, path, "ownership_mismatch");
        return;
    }
    let socket_path = PathBuf::from(&entry.socket_path);
    if owns_socket_path(&sup.sockets_dir, &entry.socket_path) {
        let _ = std::fs::remove_file(&socket_path);
    }
    let _ = std::fs::remove_file(path);
    info!(session_id = %entry.session_id, "reclaimed registry entry from dead daemon instance");
}

async fn reinstate(sup: &Arc<Supervisor>, path: &Path, entry: RegistryEntry) {
    let socket_path = PathBuf::from(&entry.socket_path);
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let connected =
        WorkerClient::connect(&socket_path, &sup.daemon_instance_id, &entry.control_token, events_tx)
            .await;

    let (client, _hello) = match connected {
        Ok(pair) => pair,
        Err(e) if e.is_retryable() => return, // keep the file, try again on the next pass
        Err(_) => {
            quarantine_file(&sup.quarantine_dir, path, "recovery_failed");
            return;
        }
    };

    let info = match client.info().await {
        Ok(info) => info,
        Err(e) if e.is_retryable() => return,
        Err(_) => {
            quarantine_file(&sup.quarantine_dir, path, "recovery_failed");
            return;
        }
    };

    if client.watch(Some(info.last_seq)).await.is_err() {
        quarantine_file(&sup.quarantine_dir, path, "recovery_failed");
        return;
    }

    let handle = Arc::new(WorkerHandle {
        session_id: entry.session_id.clone(),
        agent: entry.agent.clone(),
        cwd: entry.cwd.clone(),
        socket_path,
        registry_path: path.to_path_buf(),
        control_token: entry.control_token.clone(),
        client: RwLock::new(client),
        last_seq: AtomicU64::new(info.last_seq),
        unreachable: AtomicBool::new(false),
        unreachable_since_ms: AtomicU64::new(0),
        monitor_stop: CancellationToken::new(),
    });

    sup.workers.write().await.insert(entry.session_id.clone(), Arc::clone(&handle));
    let sup2 = Arc::clone(sup);
    tokio::spawn(async move { monitor::run(sup2, handle, events_rx).await });

    info!(session_id = %entry.session_id, "recovered worker session");
    let _ = sup.core_tx.send(CoreEvent::SessionRecovered {
        id: entry.session_id,
        agent: entry.agent,
        cwd: entry.cwd,
    });
}

/// Best-effort liveness + identity check: is `pid` alive, and is it still the
/// same process that wrote `started_at`? Linux-only; elsewhere this degrades
/// to a bare existence check (mirrors `attn_worker::registry::process_started_at`).
fn process_alive(pid: u32, started_at: u64) -> bool {
    #[cfg(target_os = "linux")]
    {
        let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) else { return false };
        let Some(after_paren) = stat.rsplit_once(')') else { return false };
        let Some(field) = after_paren.1.split_whitespace().nth(19) else { return false };
        let Ok(actual_start) = field.parse::<u64>() else { return false };
        started_at == 0 || actual_start == started_at
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = started_at;
        std::path::Path::new(&format!("/proc/{pid}")).exists()
    }
}
