// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The worker supervisor: owns the `session_id -> worker` map,
//! spawns and recovers `attn-worker` processes, and runs one monitor task per
//! live session that turns the worker's `OutputEvent` stream into
//! [`CoreEvent`]s for the attention core.

mod monitor;
mod recovery;
mod rpc_client;

pub use rpc_client::WorkerClient;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::DaemonConfig;
use crate::domain::epoch_ms;
use crate::error::DaemonError;
use crate::protocol::CoreEvent;

/// Tunables the monitor loop needs on every iteration, copied out of
/// [`DaemonConfig`] once at supervisor construction.
#[derive(Debug, Clone, Copy)]
pub struct MonitorTuning {
    pub failure_threshold: u32,
    pub unreachable_after: Duration,
    pub fast_timeout_after: Duration,
    pub fast_timeout_limit: u32,
    pub timeout_backoff: Duration,
}

/// Arguments to [`Supervisor::spawn`].
#[derive(Debug, Clone)]
pub struct SpawnOptions {
    pub id: String,
    pub agent: String,
    pub cwd: PathBuf,
    pub cols: u16,
    pub rows: u16,
    pub command: Vec<String>,
}

/// What `spawn` hands back to the core to seed the new `Session` record.
#[derive(Debug, Clone)]
pub struct SpawnedWorker {
    pub worker_pid: u32,
    pub child_pid: Option<u32>,
}

pub struct WorkerHandle {
    pub session_id: String,
    pub agent: String,
    pub cwd: String,
    pub socket_path: PathBuf,
    pub registry_path: PathBuf,
    pub control_token: String,
    pub client: RwLock<WorkerClient>,
    pub last_seq: AtomicU64,
    pub unreachable: AtomicBool,
    pub unreachable_since_ms: AtomicU64,
    pub monitor_stop: CancellationToken,
}

impl WorkerHandle {
    fn should_give_up(&self, unreachable_after: Duration) -> bool {
        let since = self.unreachable_since_ms.load(Ordering::SeqCst);
        since != 0 && epoch_ms().saturating_sub(since) >= unreachable_after.as_millis() as u64
    }

    fn mark_unreachable(&self) {
        if !self.unreachable.swap(true, Ordering::SeqCst) {
            self.unreachable_since_ms.store(epoch_ms(), Ordering::SeqCst);
        }
    }

    fn mark_reachable(&self) {
        if self.unreachable.swap(false, Ordering::SeqCst) {
            self.unreachable_since_ms.store(0, Ordering::SeqCst);
        }
    }
}

pub struct Supervisor {
    sockets_dir: PathBuf,
    registry_dir: PathBuf,
    quarantine_dir: PathBuf,
    worker_binary: String,
    daemon_instance_id: String,
    spawn_timeout: Duration,
    monitor: MonitorTuning,
    core_tx: mpsc::UnboundedSender<CoreEvent>,
    workers: RwLock<HashMap<String, Arc<WorkerHandle>>>,
}

impl Supervisor {
    pub fn new(
        config: &DaemonConfig,
        daemon_instance_id: String,
        core_tx: mpsc::UnboundedSender<CoreEvent>,
    ) -> Result<Arc<Self>, DaemonError> {
        let data_root = config.data_root();
        let sockets_dir = data_root.join("sockets");
        let registry_dir = data_root.join("registry");
        let quarantine_dir = data_root.join("quarantine");
        for dir in [&sockets_dir, &registry_dir, &quarantine_dir] {
            create_private_dir(dir)
                .map_err(|e| DaemonError::fatal(format!("cannot create {}: {e}", dir.display())))?;
        }

        Ok(Arc::new(Self {
            sockets_dir,
            registry_dir,
            quarantine_dir,
            worker_binary: config.worker_binary.clone(),
            daemon_instance_id,
            spawn_timeout: config.spawn_timeout(),
            monitor: MonitorTuning {
                failure_threshold: config.poller_failure_threshold,
                unreachable_after: Duration::from_millis(config.poller_unreachable_after_ms),
                fast_timeout_after: Duration::from_millis(config.monitor_fast_timeout_ms),
                fast_timeout_limit: config.monitor_fast_timeout_limit,
                timeout_backoff: Duration::from_millis(config.monitor_timeout_backoff_ms),
            },
            core_tx,
            workers: RwLock::new(HashMap::new()),
        }))
    }

    /// Run the recovery pass over the registry directory.
    /// Idempotent: safe to call once at startup.
    pub async fn recover(self: &Arc<Self>) {
        if let Err(e) = recovery::recover(self).await {
            warn!(err = %e, "worker registry recovery pass failed");
        }
    }

    pub async fn spawn(self: &Arc<Self>, opts: SpawnOptions) -> Result<SpawnedWorker, DaemonError> {
        validate_session_id(&opts.id)?;
        if self.workers.read().await.contains_key(&opts.id) {
            return Err(DaemonError::conflict(
                format!("session {} already exists", opts.id),
                "duplicate_session",
            ));
        }

        let control_token = rand_hex_token();
        let socket_path = self.sockets_dir.join(format!("{}.sock", opts.id));
        let registry_path = self.registry_dir.join(format!("{}.json", opts.id));
        let _ = std::fs::remove_file(&socket_path);
        let _ = std::fs::remove_file(&registry_path);

        let mut command = tokio::process::Command::new(&self.worker_binary);
        command
            .arg("--session-id")
            .arg(&opts.id)
            .arg("--agent")
            .arg(&opts.agent)
            .arg("--cwd")
            .arg(&opts.cwd)
            .arg("--cols")
            .arg(opts.cols.to_string())
            .arg("--rows")
            .arg(opts.rows.to_string())
            .arg("--socket-path")
            .arg(&socket_path)
            .arg("--registry-path")
            .arg(&registry_path)
            .arg("--daemon-instance-id")
            .arg(&self.daemon_instance_id)
            .arg("--control-token")
            .arg(&control_token)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(false);
        if !opts.command.is_empty() {
            command.arg("--command").arg(opts.command.join(" "));
        }

        let mut child = command
            .spawn()
            .map_err(|e| DaemonError::permanent(format!("failed to spawn worker binary: {e}")))?;

        let deadline = Instant::now() + self.spawn_timeout;
        let spawn_result = self.await_spawn(&socket_path, &control_token, deadline).await;

        let (worker_pid, child_pid) = match spawn_result {
            Ok(pair) => pair,
            Err(e) => {
                kill_worker(&mut child).await;
                let _ = std::fs::remove_file(&socket_path);
                let _ = std::fs::remove_file(&registry_path);
                return Err(e);
            }
        };

        drop(child); // the worker outlives its parent's Child handle by design.
        Ok(SpawnedWorker { worker_pid, child_pid })
    }

    /// Wait for the registry file to appear, then connect, hello, and start
    /// watching from seq 0. Returns the registry-reported pids on success.
    async fn await_spawn(
        &self,
        socket_path: &Path,
        control_token: &str,
        deadline: Instant,
    ) -> Result<(u32, Option<u32>), DaemonError> {
        loop {
            if Instant::now() >= deadline {
                return Err(DaemonError::transient("spawn timed out before socket appeared"));
            }
            if socket_path.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let connect =
            WorkerClient::connect(socket_path, &self.daemon_instance_id, control_token, events_tx);
        let (client, hello) = tokio::time::timeout(remaining, connect)
            .await
            .map_err(|_| DaemonError::transient("worker did not answer hello in time"))??;

        client.watch(Some(0)).await?;
        let info = client.info().await?;

        let handle = Arc::new(WorkerHandle {
            session_id: hello.session_id.clone(),
            agent: info.agent.clone(),
            cwd: info.cwd.clone(),
            socket_path: socket_path.to_path_buf(),
            registry_path: self.registry_dir.join(format!("{}.json", hello.session_id)),
            control_token: control_token.to_owned(),
            client: RwLock::new(client),
            last_seq: AtomicU64::new(info.last_seq),
            unreachable: AtomicBool::new(false),
            unreachable_since_ms: AtomicU64::new(0),
            monitor_stop: CancellationToken::new(),
        });
        let session_id = handle.session_id.clone();
        self.workers.write().await.insert(session_id, Arc::clone(&handle));

        info!(session_id = %hello.session_id, "spawned worker");
        self.start_monitor(handle, events_rx);

        Ok((info.worker_pid, info.child_pid))
    }

    fn start_monitor(
        self: &Arc<Self>,
        handle: Arc<WorkerHandle>,
        events_rx: mpsc::UnboundedReceiver<attn_wire::OutputEvent>,
    ) {
        let sup = Arc::clone(self);
        tokio::spawn(async move { monitor::run(sup, handle, events_rx).await });
    }

    pub async fn input(&self, id: &str, data: Vec<u8>) -> Result<(), DaemonError> {
        let handle = self.get(id).await?;
        let client = handle.client.read().await;
        client.input(data).await
    }

    pub async fn resize(&self, id: &str, cols: u16, rows: u16) -> Result<(), DaemonError> {
        let handle = self.get(id).await?;
        let client = handle.client.read().await;
        client.resize(cols, rows).await
    }

    pub async fn kill(&self, id: &str, signal: Option<i32>) -> Result<(), DaemonError> {
        let handle = self.get(id).await?;
        let client = handle.client.read().await;
        client.kill(signal).await
    }

    pub async fn info(&self, id: &str) -> Result<attn_wire::InfoResult, DaemonError> {
        let handle = self.get(id).await?;
        let client = handle.client.read().await;
        client.info().await
    }

    /// Orderly teardown: ask the worker to remove itself, stop its monitor,
    /// and drop it from the map. The worker's own `remove` handling deletes
    /// its registry file and socket.
    pub async fn remove(&self, id: &str) -> Result<(), DaemonError> {
        let handle = self.get(id).await?;
        handle.monitor_stop.cancel();
        {
            let client = handle.client.read().await;
            let _ = client.remove().await;
        }
        let _ = std::fs::remove_file(&handle.socket_path);
        let _ = std::fs::remove_file(&handle.registry_path);
        self.workers.write().await.remove(id);
        Ok(())
    }

    pub async fn has_session(&self, id: &str) -> bool {
        self.workers.read().await.contains_key(id)
    }

    async fn get(&self, id: &str) -> Result<Arc<WorkerHandle>, DaemonError> {
        self.workers
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| DaemonError::not_found(format!("session {id} not found")))
    }
}

async fn kill_worker(child: &mut tokio::process::Child) {
    let _ = child.start_kill();
    if tokio::time::timeout(Duration::from_secs(2), child.wait()).await.is_err() {
        warn!("worker did not exit after SIGKILL within grace window");
    }
}

/// Session ids are opaque but must be filesystem- and JSON-safe.
pub fn validate_session_id(id: &str) -> Result<(), DaemonError> {
    let valid = !id.is_empty()
        && id.len() <= 128
        && id.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | ':' | '-'));
    if valid {
        Ok(())
    } else {
        Err(DaemonError::validation(format!("invalid session id: {id}")))
    }
}

fn rand_hex_token() -> String {
    let mut bytes = [0u8; 32];
    rand::RngCore::fill_bytes(&mut rand::rng(), &mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(unix)]
fn create_private_dir(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::create_dir_all(path)?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
}

#[cfg(not(unix))]
fn create_private_dir(path: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(path)
}

/// Shared by the recovery pass and the monitor loop: whether `path` (a
/// registry's reported `socket_path`) lies under our own sockets directory.
pub(crate) fn owns_socket_path(sockets_dir: &Path, reported: &str) -> bool {
    Path::new(reported).starts_with(sockets_dir)
}

/// Move a registry file aside into quarantine with a reason suffix, rather
/// than deleting it, so an operator can inspect what recovery rejected.
pub(crate) fn quarantine_file(quarantine_dir: &Path, path: &Path, reason: &str) {
    let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else { return };
    let dest = quarantine_dir.join(format!("{file_name}.{reason}.{}", epoch_ms() / 1000));
    if let Err(e) = std::fs::rename(path, &dest) {
        warn!(err = %e, path = %path.display(), "failed to quarantine registry file");
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;

