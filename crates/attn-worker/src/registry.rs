// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Writes the worker's own registry entry.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use attn_wire::registry::{write_atomic, RegistryEntry};
use rand::RngCore;

/// Mint a fresh 32-byte control token, hex-encoded.
pub fn mint_control_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    hex_encode(&bytes)
}

/// Mint a nonce distinguishing this process's registry-file generation
/// from any prior one at the same path (used to name the atomic-write temp
/// file so two racing writers never collide).
pub fn mint_nonce() -> String {
    let mut bytes = [0u8; 8];
    rand::rng().fill_bytes(&mut bytes);
    hex_encode(&bytes)
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Best-effort process start time, used by the daemon's recovery path to
/// distinguish a live PID from a reused one. On Linux this is the process's
/// start time in clock ticks since boot (field 22 of `/proc/self/stat`);
/// elsewhere it falls back to 0, which degrades the liveness check to a
/// bare PID check.
pub fn process_started_at() -> u64 {
    #[cfg(target_os = "linux")]
    {
        if let Ok(stat) = std::fs::read_to_string("/proc/self/stat") {
            if let Some(after_paren) = stat.rsplit_once(')') {
                if let Some(start_time) = after_paren.1.split_whitespace().nth(19) {
                    if let Ok(v) = start_time.parse::<u64>() {
                        return v;
                    }
                }
            }
        }
        0
    }
    #[cfg(not(target_os = "linux"))]
    {
        0
    }
}

#[allow(clippy::too_many_arguments)]
pub fn write_registry(
    registry_path: &Path,
    socket_path: &Path,
    session_id: &str,
    daemon_instance_id: &str,
    control_token: &str,
    agent: &str,
    cwd: &Path,
    worker_pid: u32,
    child_pid: Option<u32>,
) -> anyhow::Result<()> {
    if let Some(dir) = registry_path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let entry = RegistryEntry {
        daemon_instance_id: daemon_instance_id.to_string(),
        session_id: session_id.to_string(),
        worker_pid,
        child_pid,
        socket_path: socket_path.display().to_string(),
        agent: agent.to_string(),
        cwd: cwd.display().to_string(),
        control_token: control_token.to_string(),
        owner_pid: worker_pid,
        owner_started_at: process_started_at(),
        owner_nonce: mint_nonce(),
    };
    write_atomic(registry_path, &entry)?;
    Ok(())
}

pub fn remove_registry(registry_path: &Path) {
    let _ = std::fs::remove_file(registry_path);
}

pub fn epoch_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}
