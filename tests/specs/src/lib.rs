// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end harness: spawns the real `attnd` binary and exercises it over
//! its loopback HTTP/WebSocket surface.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Once;
use std::time::Duration;

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls. Safe to call more
/// than once — only the first call has effect.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

fn workspace_root() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    manifest.parent().and_then(|p| p.parent()).map(Path::to_path_buf).unwrap_or_else(|| manifest.to_path_buf())
}

/// Resolve the path to the compiled `attnd` binary.
pub fn attnd_binary() -> PathBuf {
    workspace_root().join("target").join("debug").join("attnd")
}

/// Resolve the path to the compiled `attn-worker` binary.
pub fn worker_binary() -> PathBuf {
    workspace_root().join("target").join("debug").join("attn-worker")
}

/// Find a free TCP port by binding to :0 then releasing it.
pub fn free_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

pub const TEST_AUTH_TOKEN: &str = "attn-spec-harness-token";

/// A running `attnd` process, killed on drop, plus the data root it owns.
pub struct AttndProcess {
    child: Child,
    port: u16,
    _data_root: tempfile::TempDir,
}

impl AttndProcess {
    /// Spawn `attnd` bound to an ephemeral loopback port with its own
    /// scratch data root, pointed at the compiled `attn-worker` binary.
    pub fn start() -> anyhow::Result<Self> {
        ensure_crypto();
        let binary = attnd_binary();
        anyhow::ensure!(binary.exists(), "attnd binary not found at {}; run a debug build first", binary.display());

        let port = free_port()?;
        let data_root = tempfile::tempdir()?;

        let child = Command::new(&binary)
            .args([
                "--host",
                "127.0.0.1",
                "--port",
                &port.to_string(),
                "--auth-token",
                TEST_AUTH_TOKEN,
                "--data-root",
            ])
            .arg(data_root.path())
            .args(["--worker-binary"])
            .arg(worker_binary())
            .env("RUST_LOG", "warn")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        Ok(Self { child, port, _data_root: data_root })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://127.0.0.1:{}/ws?token={}", self.port, TEST_AUTH_TOKEN)
    }

    /// Poll `/healthz` until it answers or `timeout` elapses.
    pub async fn wait_healthy(&self, timeout: Duration) -> anyhow::Result<()> {
        let client = reqwest::Client::new();
        let url = format!("{}/healthz", self.base_url());
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("attnd did not become healthy within {timeout:?}");
            }
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status().is_success() {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

impl Drop for AttndProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
