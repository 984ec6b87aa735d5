// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end tests that spawn the real `attn-worker` binary and exercise
//! its RPC socket.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use attn_wire::{HelloResult, OutputEvent, Request, Response};
use tokio::net::UnixStream;

fn worker_binary() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join("attn-worker")
}

struct WorkerProcess {
    child: Child,
    socket_path: PathBuf,
    registry_path: PathBuf,
    _dir: tempfile::TempDir,
}

impl WorkerProcess {
    fn spawn(command: &[&str], exit_grace_ms: u64) -> anyhow::Result<Self> {
        let binary = worker_binary();
        anyhow::ensure!(binary.exists(), "attn-worker binary not found at {}", binary.display());

        let dir = tempfile::tempdir()?;
        let socket_path = dir.path().join("s1.sock");
        let registry_path = dir.path().join("s1.json");

        let child = Command::new(&binary)
            .arg("--session-id")
            .arg("s1")
            .arg("--agent")
            .arg("codex")
            .arg("--cwd")
            .arg(dir.path())
            .arg("--command")
            .arg(command.join(" "))
            .arg("--socket-path")
            .arg(&socket_path)
            .arg("--registry-path")
            .arg(&registry_path)
            .arg("--daemon-instance-id")
            .arg("daemon-1")
            .arg("--control-token")
            .arg("tok-123")
            .arg("--exit-grace-ms")
            .arg(exit_grace_ms.to_string())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        Ok(Self { child, socket_path, registry_path, _dir: dir })
    }

    async fn connect(&self) -> anyhow::Result<UnixStream> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            if let Ok(stream) = UnixStream::connect(&self.socket_path).await {
                return Ok(stream);
            }
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("socket never appeared at {}", self.socket_path.display());
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

impl Drop for WorkerProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

async fn hello(stream: &mut UnixStream) -> anyhow::Result<HelloResult> {
    attn_wire::write_json(
        stream,
        &Request::Hello {
            daemon_instance_id: "daemon-1".into(),
            control_token: "tok-123".into(),
        },
    )
    .await?;
    match attn_wire::read_json::<_, Response>(stream).await? {
        Response::Hello(r) => Ok(r),
        other => anyhow::bail!("expected Hello response, got {other:?}"),
    }
}

#[tokio::test]
async fn hello_then_info_reports_running_child() -> anyhow::Result<()> {
    let worker = WorkerProcess::spawn(&["cat"], 2000)?;
    let mut stream = worker.connect().await?;
    let hello_result = hello(&mut stream).await?;
    assert_eq!(hello_result.session_id, "s1");
    assert_eq!(hello_result.rpc_major, 1);

    attn_wire::write_json(&mut stream, &Request::Info).await?;
    match attn_wire::read_json::<_, Response>(&mut stream).await? {
        Response::Info(info) => {
            assert!(info.running);
            assert_eq!(info.agent, "codex");
        }
        other => anyhow::bail!("expected Info response, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn hello_rejects_wrong_control_token() -> anyhow::Result<()> {
    let worker = WorkerProcess::spawn(&["cat"], 500)?;
    let mut stream = worker.connect().await?;
    attn_wire::write_json(
        &mut stream,
        &Request::Hello { daemon_instance_id: "daemon-1".into(), control_token: "wrong".into() },
    )
    .await?;
    match attn_wire::read_json::<_, Response>(&mut stream).await? {
        Response::Error(e) => assert_eq!(e.code, attn_wire::WireErrorCode::Unauthorized),
        other => anyhow::bail!("expected Error response, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn input_echoes_through_watch_stream() -> anyhow::Result<()> {
    let worker = WorkerProcess::spawn(&["cat"], 2000)?;
    let mut stream = worker.connect().await?;
    hello(&mut stream).await?;

    attn_wire::write_json(&mut stream, &Request::Watch { from_seq: Some(0) }).await?;
    match attn_wire::read_json::<_, Response>(&mut stream).await? {
        Response::Ack => {}
        other => anyhow::bail!("expected Ack for watch, got {other:?}"),
    }

    attn_wire::write_json(
        &mut stream,
        &Request::Input { data: b"hello-worker\n".to_vec() },
    )
    .await?;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    let mut seen = String::new();
    loop {
        if tokio::time::Instant::now() > deadline {
            anyhow::bail!("never observed echoed input, saw: {seen:?}");
        }
        match tokio::time::timeout(
            Duration::from_millis(500),
            attn_wire::read_json::<_, serde_json::Value>(&mut stream),
        )
        .await
        {
            Ok(Ok(value)) => {
                if value.get("op").is_some() {
                    // an interleaved Ack for the Input request.
                    continue;
                }
                let event: OutputEvent = serde_json::from_value(value)?;
                if let OutputEvent::Output { data, .. } = event {
                    seen.push_str(&String::from_utf8_lossy(&data));
                    if seen.contains("hello-worker") {
                        return Ok(());
                    }
                }
            }
            Ok(Err(e)) => anyhow::bail!("read error: {e}"),
            Err(_) => continue,
        }
    }
}

#[tokio::test]
async fn registry_file_matches_socket_and_session() -> anyhow::Result<()> {
    let worker = WorkerProcess::spawn(&["sleep", "10"], 500)?;
    let _stream = worker.connect().await?;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if worker.registry_path.exists() {
            break;
        }
        if tokio::time::Instant::now() > deadline {
            anyhow::bail!("registry file never appeared");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let bytes = std::fs::read(&worker.registry_path)?;
    let entry = attn_wire::registry::parse(&bytes)?;
    assert_eq!(entry.session_id, "s1");
    assert_eq!(entry.daemon_instance_id, "daemon-1");
    assert_eq!(entry.control_token, "tok-123");
    assert_eq!(entry.socket_path, worker.socket_path.display().to_string());
    Ok(())
}

#[tokio::test]
async fn worker_process_cleans_up_after_exit_grace() -> anyhow::Result<()> {
    let mut worker = WorkerProcess::spawn(&["true"], 200)?;
    let status = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(status) = worker.child.try_wait().ok().flatten() {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await?;
    assert!(status.success());
    assert!(!worker.registry_path.exists(), "registry file should be removed on teardown");
    Ok(())
}
