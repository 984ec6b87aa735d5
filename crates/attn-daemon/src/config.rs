// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration: `clap::Parser` derive with `env` fallbacks for
//! every flag, all under an `ATTN_*` prefix.

use std::path::PathBuf;

use crate::error::DaemonError;

#[derive(Debug, Clone, clap::Parser)]
pub struct DaemonConfig {
    /// Loopback host to bind the WebSocket + health endpoint on. Any
    /// non-loopback value fails validation.
    #[arg(long, default_value = "127.0.0.1", env = "ATTN_HOST")]
    pub host: String,

    /// Port for the WebSocket + health endpoint.
    #[arg(long, default_value_t = 9849, env = "ATTN_PORT")]
    pub port: u16,

    /// Shared bearer token required on the WebSocket upgrade.
    #[arg(long, env = "ATTN_AUTH_TOKEN")]
    pub auth_token: Option<String>,

    /// Root of the daemon's data directory: `sockets/`, `registry/`,
    /// `quarantine/`, `settings.json`, etc.. Defaults to
    /// `$XDG_DATA_HOME/attn` or `~/.local/share/attn`.
    #[arg(long, env = "ATTN_DATA_ROOT")]
    pub data_root: Option<PathBuf>,

    /// Path to the `attn-worker` binary to fork for each session.
    #[arg(long, default_value = "attn-worker", env = "ATTN_WORKER_BINARY")]
    pub worker_binary: String,

    /// Token used to register the default `github.com` code-host client
    ///. Without it the poller starts with no host registered
    /// and simply surfaces nothing until one is added.
    #[arg(long, env = "ATTN_GITHUB_TOKEN")]
    pub github_token: Option<String>,

    /// PR poll cadence.
    #[arg(long, default_value_t = 60_000, env = "ATTN_POLL_INTERVAL_MS")]
    pub poll_interval_ms: u64,

    /// Deadline for a freshly spawned worker to register + answer `hello`
    /// before it's killed.
    #[arg(long, default_value_t = 5_000, env = "ATTN_SPAWN_TIMEOUT_MS")]
    pub spawn_timeout_ms: u64,

    /// Consecutive monitor failures before a session is marked unreachable.
    #[arg(long, default_value_t = 5, env = "ATTN_POLLER_FAILURE_THRESHOLD")]
    pub poller_failure_threshold: u32,

    /// How long a session may stay unreachable before eviction.
    #[arg(long, default_value_t = 30_000, env = "ATTN_POLLER_UNREACHABLE_AFTER_MS")]
    pub poller_unreachable_after_ms: u64,

    /// Fast-timeout loop guard.
    #[arg(long, default_value_t = 1_000, env = "ATTN_MONITOR_FAST_TIMEOUT_MS")]
    pub monitor_fast_timeout_ms: u64,

    #[arg(long, default_value_t = 8, env = "ATTN_MONITOR_FAST_TIMEOUT_LIMIT")]
    pub monitor_fast_timeout_limit: u32,

    #[arg(long, default_value_t = 5_000, env = "ATTN_MONITOR_TIMEOUT_BACKOFF_MS")]
    pub monitor_timeout_backoff_ms: u64,

    /// Bounded per-client outgoing queue depth.
    #[arg(long, default_value_t = 1024, env = "ATTN_CLIENT_QUEUE_CAPACITY")]
    pub client_queue_capacity: usize,

    /// Maximum interval between client heartbeats before disconnect
    ///; the disconnect threshold is 2x this value.
    #[arg(long, default_value_t = 30_000, env = "ATTN_HEARTBEAT_INTERVAL_MS")]
    pub heartbeat_interval_ms: u64,

    /// Bounded reply timeout for command dispatch.
    #[arg(long, default_value_t = 30_000, env = "ATTN_COMMAND_REPLY_TIMEOUT_MS")]
    pub command_reply_timeout_ms: u64,
}

impl DaemonConfig {
    /// Config-level validation performed before any socket bind or data-root
    /// lock; failures exit with code 2.
    pub fn validate(&self) -> Result<(), DaemonError> {
        let addr: std::net::IpAddr = self
            .host
            .parse()
            .map_err(|_| DaemonError::validation(format!("invalid host: {}", self.host)))?;
        if !addr.is_loopback() {
            return Err(DaemonError::validation(format!(
                "refusing to bind non-loopback address {addr}"
            )));
        }
        if self.port == 0 {
            return Err(DaemonError::validation("port must be nonzero"));
        }
        if self.auth_token.as_deref().is_none_or(str::is_empty) {
            return Err(DaemonError::validation("ATTN_AUTH_TOKEN must be set"));
        }
        Ok(())
    }

    pub fn data_root(&self) -> PathBuf {
        self.data_root.clone().unwrap_or_else(default_data_root)
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms)
    }

    pub fn spawn_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.spawn_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn command_reply_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.command_reply_timeout_ms)
    }
}

fn default_data_root() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        if !xdg.is_empty() {
            return PathBuf::from(xdg).join("attn");
        }
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share").join("attn");
    }
    PathBuf::from(".attn-data")
}
