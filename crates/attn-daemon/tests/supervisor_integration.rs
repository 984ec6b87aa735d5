// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end tests of the worker supervisor against the real `attn-worker`
//! binary.

use std::path::{Path, PathBuf};
use std::time::Duration;

use attn_daemon::config::DaemonConfig;
use attn_daemon::supervisor::{Supervisor, SpawnOptions};
use tokio::sync::mpsc;

fn worker_binary() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join("attn-worker")
}

fn test_config(data_root: &Path, worker_binary: PathBuf) -> DaemonConfig {
    DaemonConfig {
        host: "127.0.0.1".into(),
        port: 0,
        auth_token: Some("test-token-local".into()),
        data_root: Some(data_root.to_path_buf()),
        worker_binary: worker_binary.display().to_string(),
        github_token: None,
        poll_interval_ms: 60_000,
        spawn_timeout_ms: 3_000,
        poller_failure_threshold: 3,
        poller_unreachable_after_ms: 2_000,
        monitor_fast_timeout_ms: 1_000,
        monitor_fast_timeout_limit: 8,
        monitor_timeout_backoff_ms: 200,
        client_queue_capacity: 1024,
        heartbeat_interval_ms: 30_000,
        command_reply_timeout_ms: 30_000,
    }
}

#[tokio::test]
async fn spawn_input_and_remove_round_trip() -> anyhow::Result<()> {
    let binary = worker_binary();
    anyhow::ensure!(binary.exists(), "attn-worker binary not found at {}", binary.display());

    let data_root = tempfile::tempdir()?;
    let cwd = tempfile::tempdir()?;
    let config = test_config(data_root.path(), binary);
    let (core_tx, mut core_rx) = mpsc::unbounded_channel();
    let sup = Supervisor::new(&config, "daemon-1".into(), core_tx)?;

    let spawned = sup
        .spawn(SpawnOptions {
            id: "s1".into(),
            agent: "codex".into(),
            cwd: cwd.path().to_path_buf(),
            cols: 80,
            rows: 24,
            command: vec!["cat".into()],
        })
        .await?;
    assert!(spawned.child_pid.is_some());
    assert!(sup.has_session("s1").await);

    sup.input("s1", b"ping\n".to_vec()).await?;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    let mut saw_output = false;
    while tokio::time::Instant::now() < deadline {
        match tokio::time::timeout(Duration::from_millis(200), core_rx.recv()).await {
            Ok(Some(attn_daemon::protocol::CoreEvent::WorkerOutput { data, .. })) => {
                if String::from_utf8_lossy(&data).contains("ping") {
                    saw_output = true;
                    break;
                }
            }
            Ok(Some(_)) => continue,
            Ok(None) => break,
            Err(_) => continue,
        }
    }
    assert!(saw_output, "never observed echoed input via the monitor loop");

    sup.remove("s1").await?;
    assert!(!sup.has_session("s1").await);
    Ok(())
}

#[tokio::test]
async fn spawn_timeout_cleans_up_the_fake_worker() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let fake_binary = dir.path().join("fake-worker.sh");
    std::fs::write(&fake_binary, "#!/bin/sh\necho $$ > \"$(dirname \"$0\")/fake.pid\"\nsleep 60\n")?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&fake_binary, std::fs::Permissions::from_mode(0o755))?;
    }

    let data_root = tempfile::tempdir()?;
    let mut config = test_config(data_root.path(), fake_binary);
    config.spawn_timeout_ms = 300;
    let (core_tx, _core_rx) = mpsc::unbounded_channel();
    let sup = Supervisor::new(&config, "daemon-1".into(), core_tx)?;

    let cwd = tempfile::tempdir()?;
    let result = sup
        .spawn(SpawnOptions {
            id: "s1".into(),
            agent: "codex".into(),
            cwd: cwd.path().to_path_buf(),
            cols: 80,
            rows: 24,
            command: vec![],
        })
        .await;
    assert!(result.is_err(), "spawn should fail once the worker never registers in time");

    tokio::time::sleep(Duration::from_millis(500)).await;
    let pid_file = dir.path().join("fake.pid");
    if let Ok(pid_text) = std::fs::read_to_string(&pid_file) {
        let pid: i32 = pid_text.trim().parse().unwrap_or(0);
        assert!(pid > 0);
        #[cfg(unix)]
        {
            let alive = nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None).is_ok();
            assert!(!alive, "fake worker should have been killed after the spawn deadline");
        }
    }
    Ok(())
}

#[tokio::test]
async fn recovery_reinstates_own_session_across_a_new_supervisor() -> anyhow::Result<()> {
    let binary = worker_binary();
    anyhow::ensure!(binary.exists(), "attn-worker binary not found at {}", binary.display());

    let data_root = tempfile::tempdir()?;
    let cwd = tempfile::tempdir()?;
    let config = test_config(data_root.path(), binary);

    let (core_tx, _core_rx) = mpsc::unbounded_channel();
    let sup = Supervisor::new(&config, "daemon-1".into(), core_tx)?;
    sup.spawn(SpawnOptions {
        id: "s1".into(),
        agent: "codex".into(),
        cwd: cwd.path().to_path_buf(),
        cols: 80,
        rows: 24,
        command: vec!["sleep".into(), "30".into()],
    })
    .await?;
    assert!(sup.has_session("s1").await);
    drop(sup); // the worker process itself keeps running, orphaned.

    let (core_tx2, mut core_rx2) = mpsc::unbounded_channel();
    let sup2 = Supervisor::new(&config, "daemon-1".into(), core_tx2)?;
    sup2.recover().await;
    assert!(sup2.has_session("s1").await, "recovery should reinstate the prior session");

    let recovered = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if let Some(attn_daemon::protocol::CoreEvent::SessionRecovered { id, .. }) =
                core_rx2.recv().await
            {
                return id;
            }
        }
    })
    .await?;
    assert_eq!(recovered, "s1");

    sup2.recover().await; // idempotence: reuses the existing handle, no duplicate event semantics.
    assert!(sup2.has_session("s1").await);

    sup2.remove("s1").await?;
    Ok(())
}
