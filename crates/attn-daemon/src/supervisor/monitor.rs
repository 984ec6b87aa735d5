// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-session monitor loop: keeps one worker's `watch` stream
//! alive, reconnecting with backoff on transient failure, and evicting the
//! session on permanent failure or sustained unreachability.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use attn_wire::OutputEvent;
use tokio::sync::mpsc;
use tracing::warn;

use super::{Supervisor, WorkerClient, WorkerHandle};
use crate::protocol::CoreEvent;

const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(5);

pub async fn run(
    sup: Arc<Supervisor>,
    handle: Arc<WorkerHandle>,
    mut events_rx: mpsc::UnboundedReceiver<OutputEvent>,
) {
    let mut backoff = INITIAL_BACKOFF;
    let mut consecutive_failures: u32 = 0;
    let mut fast_timeout_count: u32 = 0;
    let mut first_pass = true;

    loop {
        if handle.monitor_stop.is_cancelled() {
            return;
        }

        if !first_pass {
            match reconnect(&sup, &handle).await {
                Ok(rx) => {
                    events_rx = rx;
                }
                Err(Outcome::Retry) => {
                    if !on_failure(&sup, &handle, &mut consecutive_failures, &mut backoff).await {
                        return;
                    }
                    continue;
                }
                Err(Outcome::GiveUp(reason)) => {
                    evict(&sup, &handle, reason).await;
                    return;
                }
            }
        }
        first_pass = false;

        consecutive_failures = 0;
        backoff = INITIAL_BACKOFF;
        handle.mark_reachable();

        let watch_started = Instant::now();
        let exited = drain_events(&sup, &handle, &mut events_rx).await;

        if exited {
            teardown(&sup, &handle).await;
            return;
        }

        if watch_started.elapsed() < sup.monitor.fast_timeout_after {
            fast_timeout_count += 1;
            if fast_timeout_count > sup.monitor.fast_timeout_limit {
                evict(&sup, &handle, "watch loop timed out too fast, too many times").await;
                return;
            }
            tokio::time::sleep(sup.monitor.timeout_backoff).await;
        } else {
            fast_timeout_count = 0;
        }

        if !on_failure(&sup, &handle, &mut consecutive_failures, &mut backoff).await {
            return;
        }
    }
}

enum Outcome {
    Retry,
    GiveUp(&'static str),
}

async fn reconnect(
    sup: &Arc<Supervisor>,
    handle: &Arc<WorkerHandle>,
) -> Result<mpsc::UnboundedReceiver<OutputEvent>, Outcome> {
    let from_seq = handle.last_seq.load(Ordering::SeqCst);
    let (tx, rx) = mpsc::unbounded_channel();
    let connected =
        WorkerClient::connect(&handle.socket_path, &sup.daemon_instance_id, &handle.control_token, tx)
            .await;
    let client = match connected {
        Ok((client, _hello)) => client,
        Err(e) if e.is_retryable() => return Err(Outcome::Retry),
        Err(_) => return Err(Outcome::GiveUp("worker rejected reconnection")),
    };
    match client.watch(Some(from_seq)).await {
        Ok(()) => {}
        Err(e) if e.is_retryable() => return Err(Outcome::Retry),
        Err(_) => return Err(Outcome::GiveUp("worker rejected watch on reconnect")),
    }
    *handle.client.write().await = client;
    Ok(rx)
}

/// Consume events until the stream closes (worker gone) or it reports `exit`.
/// Returns `true` when the session should be torn down unconditionally
/// (the child process itself exited).
async fn drain_events(
    sup: &Arc<Supervisor>,
    handle: &Arc<WorkerHandle>,
    events_rx: &mut mpsc::UnboundedReceiver<OutputEvent>,
) -> bool {
    loop {
        tokio::select! {
            _ = handle.monitor_stop.cancelled() => return false,
            event = events_rx.recv() => match event {
                Some(OutputEvent::Output { seq, data }) => {
                    handle.last_seq.store(seq, Ordering::SeqCst);
                    let _ = sup.core_tx.send(CoreEvent::WorkerOutput {
                        id: handle.session_id.clone(),
                        seq,
                        data,
                    });
                }
                Some(OutputEvent::State { seq, state }) => {
                    handle.last_seq.store(seq, Ordering::SeqCst);
                    let _ = sup.core_tx.send(CoreEvent::WorkerState {
                        id: handle.session_id.clone(),
                        state: state.into(),
                    });
                }
                Some(OutputEvent::Exit { code, signal, .. }) => {
                    let _ = sup.core_tx.send(CoreEvent::WorkerExited {
                        id: handle.session_id.clone(),
                        code,
                        signal,
                    });
                    return true;
                }
                Some(OutputEvent::Desync { reason }) => {
                    warn!(session_id = %handle.session_id, reason, "worker watch stream desynced");
                }
                None => return false,
            }
        }
    }
}

/// Record one more monitor-cycle failure, warn once on crossing the
/// unreachable threshold, and evict once sustained past the deadline.
/// Returns `false` when the caller should stop (the session was evicted).
async fn on_failure(
    sup: &Arc<Supervisor>,
    handle: &Arc<WorkerHandle>,
    consecutive_failures: &mut u32,
    backoff: &mut Duration,
) -> bool {
    *consecutive_failures += 1;
    if *consecutive_failures >= sup.monitor.failure_threshold {
        let was_reachable = !handle.unreachable.load(Ordering::SeqCst);
        handle.mark_unreachable();
        if was_reachable {
            let _ = sup.core_tx.send(CoreEvent::WorkerUnreachable { id: handle.session_id.clone() });
        }
    }
    if handle.should_give_up(sup.monitor.unreachable_after) {
        evict(sup, handle, "unreachable past the eviction deadline").await;
        return false;
    }
    tokio::time::sleep(*backoff).await;
    *backoff = (*backoff * 2).min(MAX_BACKOFF);
    true
}

async fn teardown(sup: &Arc<Supervisor>, handle: &Arc<WorkerHandle>) {
    let _ = std::fs::remove_file(&handle.socket_path);
    let _ = std::fs::remove_file(&handle.registry_path);
    sup.workers.write().await.remove(&handle.session_id);
}

async fn evict(sup: &Arc<Supervisor>, handle: &Arc<WorkerHandle>, reason: &'static str) {
    handle.monitor_stop.cancel();
    teardown(sup, handle).await;
    let _ = sup.core_tx.send(CoreEvent::SessionEvicted {
        id: handle.session_id.clone(),
        reason: reason.to_owned(),
    });
}
