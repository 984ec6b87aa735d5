// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! attn: a local developer attention broker daemon. Supervises PTY-based
//! coding-agent sessions and polls code-review hosts, fanning both out over
//! a single loopback WebSocket.

pub mod collab;
pub mod config;
pub mod core;
pub mod domain;
pub mod error;
pub mod hostclient;
pub mod lockfile;
pub mod poller;
pub mod protocol;
pub mod supervisor;
pub mod transport;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::DaemonConfig;
use crate::core::{Core, CoreDeps};
use crate::error::DaemonError;
use crate::hostclient::{ClientRegistry, HostClient};
use crate::lockfile::DaemonLock;
use crate::poller::Poller;
use crate::protocol::{CommandEnvelope, CoreEvent, Event};
use crate::supervisor::Supervisor;
use crate::transport::HubState;

/// Run the daemon until shutdown: validate config, claim the data root,
/// recover any surviving worker sessions, wire the attention core to the
/// supervisor/poller/host registry, and serve the client hub.
pub async fn run(config: DaemonConfig) -> Result<(), DaemonError> {
    config.validate()?;

    let data_root = config.data_root();
    let lock = DaemonLock::acquire(&data_root)?;
    let daemon_instance_id = lock.daemon_instance_id.clone();
    info!(%daemon_instance_id, data_root = %data_root.display(), "attn daemon starting");

    let shutdown = CancellationToken::new();
    let (broadcast_tx, _) = broadcast::channel::<Event>(1024);
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<CommandEnvelope>();
    let (core_tx, core_rx) = mpsc::unbounded_channel::<CoreEvent>();
    let (settings_tx, settings_rx) = watch::channel(crate::domain::Settings::default());

    let supervisor = Supervisor::new(&config, daemon_instance_id.clone(), core_tx.clone())?;
    supervisor.recover().await;

    let hostclients = Arc::new(ClientRegistry::new());
    if let Some(token) = config.github_token.clone() {
        let client = HostClient::new("github.com", "https://api.github.com", token)
            .map_err(|e| DaemonError::fatal(format!("cannot register github.com host client: {e}")))?;
        hostclients.register(client).await;
    }

    let poller = Poller::new(Arc::clone(&hostclients), core_tx.clone(), settings_rx);
    let poller_handle = tokio::spawn({
        let poller = Arc::clone(&poller);
        let shutdown = shutdown.clone();
        async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = poller.run() => {}
            }
        }
    });

    let core = Core::new(CoreDeps {
        daemon_instance_id: daemon_instance_id.clone(),
        data_root: data_root.clone(),
        supervisor: Arc::clone(&supervisor),
        hostclients: Arc::clone(&hostclients),
        poller: Arc::clone(&poller),
        settings_tx,
        broadcast_tx: broadcast_tx.clone(),
        core_tx,
    })?;
    let core_handle = tokio::spawn(core.run(cmd_rx, core_rx, shutdown.clone()));

    let hub = Arc::new(HubState { cmd_tx, broadcast_tx, config: config.clone() });
    let router = transport::build_router(hub);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| DaemonError::fatal(format!("cannot bind {addr}: {e}")))?;
    info!(%addr, "attn daemon listening");

    let serve_shutdown = shutdown.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { serve_shutdown.cancelled().await })
        .await
        .map_err(|e| DaemonError::fatal(format!("server error: {e}")))?;

    shutdown.cancel();
    poller.stop_token().cancel();
    let _ = poller_handle.await;
    let _ = core_handle.await;

    Ok(())
}
