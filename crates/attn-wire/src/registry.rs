// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The on-disk worker registry entry.
//!
//! One file per live session, written atomically by the worker
//! (write-tempfile + rename) and read by the daemon's supervisor during
//! recovery. Living in this crate rather than either of `attn-worker` or
//! `attn-daemon` because both sides need the exact same shape without a
//! dependency edge between them.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// A live session's binding between the worker process, its socket, and the
/// daemon instance that spawned it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegistryEntry {
    pub daemon_instance_id: String,
    pub session_id: String,
    pub worker_pid: u32,
    pub child_pid: Option<u32>,
    pub socket_path: String,
    pub agent: String,
    pub cwd: String,
    pub control_token: String,
    pub owner_pid: u32,
    /// Owner process start time, opaque OS-specific value (e.g. ticks since
    /// boot on Linux), used to disambiguate a live PID from a reused one.
    pub owner_started_at: u64,
    pub owner_nonce: String,
}

/// Write `entry` to `path` atomically: write to a sibling temp file in the
/// same directory, then `rename` over the destination. `rename` within one
/// filesystem is atomic, so a reader never observes a partially-written file.
pub fn write_atomic(path: &Path, entry: &RegistryEntry) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let file_name =
        path.file_name().and_then(|n| n.to_str()).unwrap_or("registry").to_string();
    let tmp_path = dir.join(format!(".{file_name}.tmp.{}", entry.owner_nonce));

    let json = serde_json::to_vec_pretty(entry)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    {
        use std::io::Write;
        let mut f = std::fs::File::create(&tmp_path)?;
        set_owner_only(&tmp_path)?;
        f.write_all(&json)?;
        f.sync_all()?;
    }
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Parse a registry file's raw bytes. Callers move malformed files aside
/// (`.malformed.<epoch>`) rather than deleting them; parsing failure is
/// reported distinctly from "file not found" so recovery can tell them apart.
pub fn parse(bytes: &[u8]) -> Result<RegistryEntry, serde_json::Error> {
    serde_json::from_slice(bytes)
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

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RegistryEntry {
        RegistryEntry {
            daemon_instance_id: "d1".into(),
            session_id: "s1".into(),
            worker_pid: 123,
            child_pid: Some(456),
            socket_path: "/tmp/sockets/s1.sock".into(),
            agent: "codex".into(),
            cwd: "/tmp".into(),
            control_token: "tok".into(),
            owner_pid: 123,
            owner_started_at: 999,
            owner_nonce: "nonce1".into(),
        }
    }

    #[test]
    fn roundtrips_through_atomic_write() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("s1.json");
        write_atomic(&path, &sample()).expect("write");
        let bytes = std::fs::read(&path).expect("read");
        let parsed = parse(&bytes).expect("parse");
        assert_eq!(parsed, sample());
    }

    #[test]
    fn leaves_no_temp_file_behind() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("s1.json");
        write_atomic(&path, &sample()).expect("write");
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .expect("read_dir")
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with('.'))
            .collect();
        assert!(leftovers.is_empty(), "temp file left behind: {leftovers:?}");
    }

    #[test]
    fn parse_rejects_malformed_json() {
        assert!(parse(b"not json").is_err());
    }
}
