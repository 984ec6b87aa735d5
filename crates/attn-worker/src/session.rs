// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The worker's view of its one session: PTY + classifier + replay buffer.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use attn_term::{Classifier, ClassifierConfig};
use attn_wire::{OutputEvent, WireState};
use nix::sys::signal::Signal;
use tokio::sync::{broadcast, Mutex};

use crate::pty::PtySession;

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn to_wire(state: attn_term::SessionState) -> WireState {
    match state {
        attn_term::SessionState::Launching => WireState::Launching,
        attn_term::SessionState::Working => WireState::Working,
        attn_term::SessionState::WaitingInput => WireState::WaitingInput,
        attn_term::SessionState::PendingApproval => WireState::PendingApproval,
        attn_term::SessionState::Idle => WireState::Idle,
        attn_term::SessionState::Unknown => WireState::Unknown,
    }
}

/// Shared, lock-guarded worker state. `pty` is written once at construction
/// and never replaced, so it's kept outside the mutex for cheap concurrent
/// reads from the I/O pump and the RPC handler.
pub struct Session {
    pub session_id: String,
    pub agent: String,
    pub cwd: String,
    pub pty: PtySession,
    pub worker_pid: u32,
    pub classifier: Mutex<Classifier>,
    pub ring: Mutex<crate::event_ring::EventRing>,
    pub events_tx: broadcast::Sender<OutputEvent>,
    pub running: AtomicBool,
    pub last_exit_code: AtomicU32,
    pub cols: AtomicU32,
    pub rows: AtomicU32,
}

impl Session {
    pub fn new(
        session_id: String,
        agent: String,
        cwd: &Path,
        pty: PtySession,
        cols: u16,
        rows: u16,
        replay_capacity: usize,
    ) -> anyhow::Result<Arc<Self>> {
        let classifier = Classifier::new(
            &agent,
            ClassifierConfig { cols, rows, ..ClassifierConfig::default() },
            now_ms(),
        )?;
        let (events_tx, _) = broadcast::channel(1024);
        Ok(Arc::new(Self {
            session_id,
            agent,
            cwd: cwd.display().to_string(),
            worker_pid: std::process::id(),
            classifier: Mutex::new(classifier),
            ring: Mutex::new(crate::event_ring::EventRing::new(replay_capacity)),
            events_tx,
            running: AtomicBool::new(true),
            last_exit_code: AtomicU32::new(0),
            cols: AtomicU32::new(cols as u32),
            rows: AtomicU32::new(rows as u32),
            pty,
        }))
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn state(&self) -> WireState {
        // best-effort snapshot without awaiting the lock from sync contexts
        to_wire(self.classifier.try_lock().map(|c| c.state()).unwrap_or(attn_term::SessionState::Unknown))
    }

    /// Feed a chunk of PTY output through the classifier, append an
    /// `Output` event (and a `State` event if the state changed), and
    /// broadcast both. Called from the I/O pump task only.
    pub async fn on_output(&self, data: &[u8]) {
        let mut classifier = self.classifier.lock().await;
        let prev_state = classifier.state();
        let transition = classifier.feed(data, now_ms());
        drop(classifier);

        let mut ring = self.ring.lock().await;
        let output_event = ring.push(|seq| OutputEvent::Output { seq, data: data.to_vec() });
        let _ = self.events_tx.send(output_event);

        if let Some(t) = transition {
            if t.state != prev_state {
                let state_event =
                    ring.push(|seq| OutputEvent::State { seq, state: to_wire(t.state) });
                let _ = self.events_tx.send(state_event);
            }
        }
    }

    /// Re-evaluate the classifier against the clock with no new bytes, for
    /// the idle decay. Emits a `State` event only on an actual change.
    pub async fn on_tick(&self) {
        let mut classifier = self.classifier.lock().await;
        let prev_state = classifier.state();
        let transition = classifier.tick(now_ms());
        drop(classifier);

        if let Some(t) = transition {
            if t.state != prev_state {
                let mut ring = self.ring.lock().await;
                let state_event =
                    ring.push(|seq| OutputEvent::State { seq, state: to_wire(t.state) });
                let _ = self.events_tx.send(state_event);
            }
        }
    }

    pub async fn on_exit(&self, code: Option<i32>, signal: Option<i32>) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(c) = code {
            self.last_exit_code.store(c as u32, Ordering::Relaxed);
        }
        let mut ring = self.ring.lock().await;
        let event = ring.push(|seq| OutputEvent::Exit { seq, code, signal });
        let _ = self.events_tx.send(event);
    }

    pub async fn resize(&self, cols: u16, rows: u16) -> anyhow::Result<()> {
        self.pty.resize(cols, rows)?;
        self.cols.store(cols as u32, Ordering::Relaxed);
        self.rows.store(rows as u32, Ordering::Relaxed);
        self.classifier.lock().await.resize(cols, rows);
        Ok(())
    }

    pub fn signal(&self, signal: Signal) -> anyhow::Result<()> {
        self.pty.signal(signal)
    }

    pub async fn screen_snapshot(&self) -> attn_term::ScreenSnapshot {
        self.classifier.lock().await.screen().snapshot()
    }
}
