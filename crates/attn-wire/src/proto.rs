// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message shapes for the worker RPC socket.

use serde::{Deserialize, Serialize};

/// Session lifecycle state as carried on the wire. Mirrors `attn_term::SessionState`
/// but kept independent since this crate has no dependency on the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireState {
    Launching,
    Working,
    WaitingInput,
    PendingApproval,
    Idle,
    Unknown,
}

/// Top-level request envelope sent by the supervisor to a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Hello { daemon_instance_id: String, control_token: String },
    Info,
    Health,
    Watch { from_seq: Option<u64> },
    Input { data: Vec<u8> },
    Resize { cols: u16, rows: u16 },
    Kill { signal: Option<i32> },
    Remove,
}

/// Top-level response envelope returned by a worker for a one-shot request
/// (`hello`, `info`, `health`, `input`, `resize`, `kill`, `remove`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Response {
    Hello(HelloResult),
    Info(InfoResult),
    Health(HealthResult),
    Ack,
    Error(WireError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloResult {
    pub worker_version: String,
    pub rpc_major: u32,
    pub rpc_minor: u32,
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfoResult {
    pub running: bool,
    pub agent: String,
    pub cwd: String,
    pub cols: u16,
    pub rows: u16,
    pub worker_pid: u32,
    pub child_pid: Option<u32>,
    pub last_seq: u64,
    pub state: WireState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screen_snapshot: Option<ScreenSnapshotWire>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResult {
    pub ok: bool,
    pub running: bool,
}

/// Wire representation of a rendered screen, independent of `attn_term`'s
/// internal `avt::Vt`-backed type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenSnapshotWire {
    pub lines: Vec<String>,
    pub cols: u16,
    pub rows: u16,
    pub alt_screen: bool,
    pub cursor_row: u16,
    pub cursor_col: u16,
}

/// A single event on a `watch` stream, length-prefixed like every other frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputEvent {
    Output { seq: u64, data: Vec<u8> },
    State { seq: u64, state: WireState },
    Exit { seq: u64, code: Option<i32>, signal: Option<i32> },
    Desync { reason: String },
}

impl OutputEvent {
    /// The monotonic sequence number, if this event carries one (`Desync` does not).
    pub fn seq(&self) -> Option<u64> {
        match self {
            Self::Output { seq, .. } | Self::State { seq, .. } | Self::Exit { seq, .. } => {
                Some(*seq)
            }
            Self::Desync { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireErrorCode {
    Unauthorized,
    UnsupportedVersion,
    BadRequest,
    NotRunning,
    Internal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireError {
    pub code: WireErrorCode,
    pub message: String,
}

impl WireError {
    pub fn new(code: WireErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}
