// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lockfile: exclusive `flock` on `<data_root>/daemon.lock`, holding
//! the `DaemonInstanceID` for this run.
//!
//! A failure to acquire the lock means another daemon instance already owns
//! this data root — a `Fatal` error mapping to exit code 3.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use fs2::FileExt;

use crate::error::DaemonError;

pub struct DaemonLock {
    // held for its Drop impl, which releases the flock.
    _file: File,
    pub daemon_instance_id: String,
}

impl DaemonLock {
    /// Acquire the lock at `<data_root>/daemon.lock`, minting a fresh
    /// `DaemonInstanceID` on first acquisition or reusing one found in the
    /// file from a prior run at the same data root.
    pub fn acquire(data_root: &Path) -> Result<Self, DaemonError> {
        std::fs::create_dir_all(data_root)
            .map_err(|e| DaemonError::fatal(format!("cannot create data root: {e}")))?;
        let lock_path = data_root.join("daemon.lock");

        let mut file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| DaemonError::fatal(format!("cannot open lockfile: {e}")))?;

        file.try_lock_exclusive().map_err(|_| {
            DaemonError::fatal(format!(
                "data root {} is locked by another daemon instance",
                data_root.display()
            ))
        })?;

        let mut existing = String::new();
        let _ = file.read_to_string(&mut existing);
        let daemon_instance_id = existing.trim().to_owned();
        let daemon_instance_id = if daemon_instance_id.is_empty() {
            let id = mint_instance_id();
            file.set_len(0)
                .map_err(|e| DaemonError::fatal(format!("cannot truncate lockfile: {e}")))?;
            use std::io::Seek;
            file.seek(std::io::SeekFrom::Start(0))
                .map_err(|e| DaemonError::fatal(format!("cannot seek lockfile: {e}")))?;
            writeln!(file, "{id}")
                .map_err(|e| DaemonError::fatal(format!("cannot write lockfile: {e}")))?;
            file.sync_all().map_err(|e| DaemonError::fatal(format!("cannot sync lockfile: {e}")))?;
            id
        } else {
            daemon_instance_id
        };

        Ok(Self { _file: file, daemon_instance_id })
    }
}

fn mint_instance_id() -> String {
    let mut bytes = [0u8; 16];
    rand::RngCore::fill_bytes(&mut rand::rng(), &mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
#[path = "lockfile_tests.rs"]
mod tests;
