// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use clap::Parser;

/// Configuration for a single PTY worker process.
///
/// The supervisor forks this binary with these as argv flags and passes the
/// `control_token` separately via `ATTN_WORKER_CONTROL_TOKEN` so it never
/// shows up in `ps`.
#[derive(Debug, Parser)]
#[command(name = "attn-worker", version, about = "PTY worker for a supervised agent session")]
pub struct WorkerConfig {
    /// Opaque session id, matches `[A-Za-z0-9._:-]+`.
    #[arg(long, env = "ATTN_WORKER_SESSION_ID")]
    pub session_id: String,

    /// Agent name (claude, codex, copilot, ...), used to select classifier rules.
    #[arg(long, env = "ATTN_WORKER_AGENT")]
    pub agent: String,

    /// Working directory for the spawned agent process.
    #[arg(long, env = "ATTN_WORKER_CWD")]
    pub cwd: PathBuf,

    /// Command and arguments to execute in the PTY. Defaults to the agent
    /// name itself as a bare command (overridable via `executable_override`
    /// on spawn, which the supervisor renders into this list).
    #[arg(long, env = "ATTN_WORKER_COMMAND", value_delimiter = ' ')]
    pub command: Vec<String>,

    #[arg(long, env = "ATTN_WORKER_COLS", default_value = "80")]
    pub cols: u16,

    #[arg(long, env = "ATTN_WORKER_ROWS", default_value = "24")]
    pub rows: u16,

    /// Path the RPC Unix socket is bound at (`sockets/<session_id>.sock`).
    #[arg(long, env = "ATTN_WORKER_SOCKET_PATH")]
    pub socket_path: PathBuf,

    /// Path the registry file is written to (`registry/<session_id>.json`).
    #[arg(long, env = "ATTN_WORKER_REGISTRY_PATH")]
    pub registry_path: PathBuf,

    /// UUID of the daemon instance that spawned this worker.
    #[arg(long, env = "ATTN_WORKER_DAEMON_INSTANCE_ID")]
    pub daemon_instance_id: String,

    /// Shared secret the supervisor must present on `hello`. Never logged.
    #[arg(long, env = "ATTN_WORKER_CONTROL_TOKEN")]
    pub control_token: String,

    /// Number of recent output events retained for resumable `watch` replay.
    #[arg(long, env = "ATTN_WORKER_REPLAY_CAPACITY", default_value = "4096")]
    pub replay_capacity: usize,

    /// How long to linger after the child exits before tearing down, giving
    /// a disconnected client a chance to reattach and observe the final
    /// `exit` event.
    #[arg(long, env = "ATTN_WORKER_EXIT_GRACE_MS", default_value = "5000")]
    pub exit_grace_ms: u64,
}

impl WorkerConfig {
    /// The command to execute in the PTY: explicit `--command` if given,
    /// otherwise the bare agent name.
    pub fn resolved_command(&self) -> Vec<String> {
        if self.command.is_empty() {
            vec![self.agent.clone()]
        } else {
            self.command.clone()
        }
    }
}
