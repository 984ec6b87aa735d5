// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session-lifecycle command handlers. `spawn_session`
//! is the one session command long enough to offload: forking the worker
//! and waiting for its `hello` can take up to the configured spawn timeout,
//! which would otherwise stall every other client's commands.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::oneshot;

use super::Core;
use crate::domain::{Session, SessionState};
use crate::error::DaemonError;
use crate::protocol::{CoreEvent, Event};
use crate::supervisor::SpawnOptions;

fn parse_state(raw: &str) -> Result<SessionState, DaemonError> {
    match raw {
        "launching" => Ok(SessionState::Launching),
        "working" => Ok(SessionState::Working),
        "waiting_input" => Ok(SessionState::WaitingInput),
        "pending_approval" => Ok(SessionState::PendingApproval),
        "idle" => Ok(SessionState::Idle),
        "unknown" => Ok(SessionState::Unknown),
        other => Err(DaemonError::validation(format!("unknown session state: {other}"))),
    }
}

fn state_name(state: SessionState) -> &'static str {
    match state {
        SessionState::Launching => "launching",
        SessionState::Working => "working",
        SessionState::WaitingInput => "waiting_input",
        SessionState::PendingApproval => "pending_approval",
        SessionState::Idle => "idle",
        SessionState::Unknown => "unknown",
    }
}

impl Core {
    #[allow(clippy::too_many_arguments)]
    pub(super) async fn cmd_spawn_session(
        &mut self,
        id: String,
        agent: String,
        cwd: String,
        cols: Option<u16>,
        rows: Option<u16>,
        _label: Option<String>,
        resume_session_id: Option<String>,
        fork_session: bool,
        executable_override: Option<String>,
        reply: oneshot::Sender<Result<Event, DaemonError>>,
    ) {
        if crate::supervisor::validate_session_id(&id).is_err() {
            let _ = reply.send(Ok(Event::SpawnResult { id, ok: false, error: Some("invalid session id".to_owned()) }));
            return;
        }

        let mut command = Vec::new();
        if let Some(exe) = executable_override {
            command.push(exe);
        }
        if let Some(resume) = resume_session_id {
            command.push(if fork_session { "--fork".to_owned() } else { "--resume".to_owned() });
            command.push(resume);
        }

        let opts = SpawnOptions {
            id: id.clone(),
            agent: agent.clone(),
            cwd: PathBuf::from(&cwd),
            cols: cols.unwrap_or(80),
            rows: rows.unwrap_or(24),
            command,
        };

        let supervisor = Arc::clone(&self.supervisor);
        let core_tx = self.core_tx.clone();
        let cols = opts.cols;
        let rows = opts.rows;
        tokio::spawn(async move {
            match supervisor.spawn(opts).await {
                Ok(_spawned) => {
                    let _ = reply.send(Ok(Event::SpawnResult { id: id.clone(), ok: true, error: None }));
                    let _ = core_tx.send(CoreEvent::SessionSpawned { id, agent, cwd, cols, rows });
                }
                Err(e) => {
                    let _ = reply.send(Ok(Event::SpawnResult { id, ok: false, error: Some(e.message().to_owned()) }));
                }
            }
        });
    }

    pub(super) async fn cmd_attach_session(
        &mut self,
        id: String,
        _from_seq: Option<u64>,
        reply: oneshot::Sender<Result<Event, DaemonError>>,
    ) {
        match self.supervisor.info(&id).await {
            Ok(info) => {
                if let Some(session) = self.sessions.get_mut(&id) {
                    session.last_seen = crate::domain::epoch_ms() / 1000;
                }
                let _ = reply.send(Ok(Event::AttachResult {
                    id,
                    running: info.running,
                    last_seq: info.last_seq,
                    state: state_name(info.state.into()).to_owned(),
                }));
            }
            Err(e) => {
                let _ = reply.send(Err(e));
            }
        }
    }

    pub(super) async fn cmd_kill_session(&mut self, id: String, signal: Option<i32>, reply: oneshot::Sender<Result<Event, DaemonError>>) {
        let result = self.supervisor.kill(&id, signal).await;
        let _ = reply.send(result.map(|_| Event::Ack));
    }

    pub(super) async fn cmd_register(&mut self, id: String, agent: String, cwd: String, reply: oneshot::Sender<Result<Event, DaemonError>>) {
        if crate::supervisor::validate_session_id(&id).is_err() {
            let _ = reply.send(Err(DaemonError::validation(format!("invalid session id: {id}"))));
            return;
        }
        let now = crate::domain::epoch_ms() / 1000;
        let session = Session::new(id, agent, cwd, now);
        self.sessions.insert(session.id.clone(), session.clone());
        self.sync_repos_and_authors();
        self.broadcast(Event::SessionRegistered { session });
        let _ = reply.send(Ok(Event::Ack));
    }

    pub(super) async fn cmd_unregister(&mut self, id: String, reply: oneshot::Sender<Result<Event, DaemonError>>) {
        if self.sessions.shift_remove(&id).is_none() {
            let _ = reply.send(Err(DaemonError::not_found(format!("unknown session {id}"))));
            return;
        }
        if self.supervisor.has_session(&id).await {
            let _ = self.supervisor.remove(&id).await;
        }
        self.sync_repos_and_authors();
        self.broadcast(Event::SessionUnregistered { id });
        let _ = reply.send(Ok(Event::Ack));
    }

    pub(super) async fn cmd_state(&mut self, id: String, state: String, reply: oneshot::Sender<Result<Event, DaemonError>>) {
        let state = match parse_state(&state) {
            Ok(s) => s,
            Err(e) => {
                let _ = reply.send(Err(e));
                return;
            }
        };
        let Some(session) = self.sessions.get_mut(&id) else {
            let _ = reply.send(Err(DaemonError::not_found(format!("unknown session {id}"))));
            return;
        };
        let now = crate::domain::epoch_ms() / 1000;
        session.apply_state(state, now);
        let state_since = session.state_since;
        self.broadcast(Event::SessionStateChanged { id, state: state_name(state).to_owned(), state_since });
        let _ = reply.send(Ok(Event::Ack));
    }

    pub(super) async fn cmd_todos(&mut self, id: String, todos: Vec<String>, reply: oneshot::Sender<Result<Event, DaemonError>>) {
        let Some(session) = self.sessions.get_mut(&id) else {
            let _ = reply.send(Err(DaemonError::not_found(format!("unknown session {id}"))));
            return;
        };
        session.todos = todos.clone();
        self.broadcast(Event::SessionTodosUpdated { id, todos });
        let _ = reply.send(Ok(Event::Ack));
    }

    pub(super) async fn cmd_stop(&mut self, id: String, reply: oneshot::Sender<Result<Event, DaemonError>>) {
        let result = self.supervisor.kill(&id, Some(15)).await;
        let _ = reply.send(result.map(|_| Event::Ack));
    }

    pub(super) async fn cmd_mute_session(&mut self, id: String, muted: bool, reply: oneshot::Sender<Result<Event, DaemonError>>) {
        let Some(session) = self.sessions.get_mut(&id) else {
            let _ = reply.send(Err(DaemonError::not_found(format!("unknown session {id}"))));
            return;
        };
        session.muted = muted;
        self.broadcast(Event::SessionsUpdated { sessions: self.sessions_snapshot() });
        let _ = reply.send(Ok(Event::Ack));
    }

    /// Drops any session entry whose backing worker is gone, e.g. one a
    /// crashed daemon instance left dangling before this instance's recovery
    /// pass ran. Live, supervisor-backed sessions are untouched.
    pub(super) async fn cmd_clear_sessions(&mut self, reply: oneshot::Sender<Result<Event, DaemonError>>) {
        let mut live = Vec::new();
        for id in self.sessions.keys().cloned().collect::<Vec<_>>() {
            if self.supervisor.has_session(&id).await {
                live.push(id);
            }
        }
        self.sessions.retain(|id, _| live.contains(id));
        self.sync_repos_and_authors();
        self.broadcast(Event::SessionsUpdated { sessions: self.sessions_snapshot() });
        let _ = reply.send(Ok(Event::Ack));
    }

    pub(super) async fn cmd_session_visualized(&mut self, id: String, reply: oneshot::Sender<Result<Event, DaemonError>>) {
        let Some(session) = self.sessions.get_mut(&id) else {
            let _ = reply.send(Err(DaemonError::not_found(format!("unknown session {id}"))));
            return;
        };
        session.needs_review_after_long_run = false;
        let _ = reply.send(Ok(Event::Ack));
    }

    pub(super) async fn cmd_pty_input(&mut self, id: String, data: Vec<u8>, reply: oneshot::Sender<Result<Event, DaemonError>>) {
        let result = self.supervisor.input(&id, data).await;
        let _ = reply.send(result.map(|_| Event::Ack));
    }

    pub(super) async fn cmd_pty_resize(&mut self, id: String, cols: u16, rows: u16, reply: oneshot::Sender<Result<Event, DaemonError>>) {
        let result = self.supervisor.resize(&id, cols, rows).await;
        let _ = reply.send(result.map(|_| Event::Ack));
    }

    pub(super) async fn apply_session_event(&mut self, event: CoreEvent) {
        match event {
            CoreEvent::WorkerState { id, state } => {
                let now = crate::domain::epoch_ms() / 1000;
                if let Some(session) = self.sessions.get_mut(&id) {
                    if session.apply_state(state, now) {
                        let state_since = session.state_since;
                        self.broadcast(Event::SessionStateChanged { id, state: state_name(state).to_owned(), state_since });
                    }
                }
            }
            CoreEvent::WorkerExited { id, code, signal } => {
                self.sessions.shift_remove(&id);
                self.sync_repos_and_authors();
                self.broadcast(Event::SessionExited { id, code, signal });
            }
            CoreEvent::WorkerUnreachable { id } => {
                self.push_warning("session_unreachable", format!("session {id} is unreachable"));
            }
            CoreEvent::SessionEvicted { id, reason } => {
                self.sessions.shift_remove(&id);
                self.sync_repos_and_authors();
                self.push_warning("session_evicted", format!("session {id} evicted: {reason}"));
                self.broadcast(Event::SessionUnregistered { id });
            }
            CoreEvent::SessionRecovered { id, agent, cwd } => {
                let now = crate::domain::epoch_ms() / 1000;
                let session = Session::new(id, agent, cwd, now);
                self.sessions.insert(session.id.clone(), session.clone());
                self.sync_repos_and_authors();
                self.broadcast(Event::SessionRegistered { session });
            }
            CoreEvent::SessionSpawned { id, agent, cwd, .. } => {
                let now = crate::domain::epoch_ms() / 1000;
                let session = Session::new(id, agent, cwd, now);
                self.sessions.insert(session.id.clone(), session.clone());
                self.sync_repos_and_authors();
                self.broadcast(Event::SessionRegistered { session });
            }
            _ => {}
        }
    }
}
