// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Core data model: sessions, pull requests, repos, authors, warnings, and
//! rate-limit snapshots. All of it lives in the attention core's memory; the
//! types here carry no behavior of their own beyond serialization.

use serde::{Deserialize, Serialize};

pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Launching,
    Working,
    WaitingInput,
    PendingApproval,
    Idle,
    Unknown,
}

impl From<attn_wire::WireState> for SessionState {
    fn from(value: attn_wire::WireState) -> Self {
        match value {
            attn_wire::WireState::Launching => Self::Launching,
            attn_wire::WireState::Working => Self::Working,
            attn_wire::WireState::WaitingInput => Self::WaitingInput,
            attn_wire::WireState::PendingApproval => Self::PendingApproval,
            attn_wire::WireState::Idle => Self::Idle,
            attn_wire::WireState::Unknown => Self::Unknown,
        }
    }
}

/// A supervised agent run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub agent: String,
    pub directory: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub main_repo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub state: SessionState,
    pub state_since: u64,
    pub state_updated_at: u64,
    pub last_seen: u64,
    pub muted: bool,
    pub todos: Vec<String>,
    pub needs_review_after_long_run: bool,
}

impl Session {
    pub fn new(id: String, agent: String, directory: String, now: u64) -> Self {
        Self {
            id,
            agent,
            directory,
            branch: None,
            main_repo: None,
            label: None,
            state: SessionState::Launching,
            state_since: now,
            state_updated_at: now,
            last_seen: now,
            muted: false,
            todos: Vec::new(),
            needs_review_after_long_run: false,
        }
    }

    /// Apply a classifier-derived state report. Only the core calls this, and
    /// only here is `state_since` ever bumped.
    pub fn apply_state(&mut self, state: SessionState, now: u64) -> bool {
        self.last_seen = now;
        if state != self.state {
            self.state = state;
            self.state_since = now;
            self.state_updated_at = now;
            true
        } else {
            self.state_updated_at = now;
            false
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrRole {
    Author,
    Reviewer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrState {
    Waiting,
    Working,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrReason {
    ReviewNeeded,
    ChangesRequested,
    CiFailed,
    ReadyToMerge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CiStatus {
    Success,
    Pending,
    Failure,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeatState {
    Cold,
    Warm,
    Hot,
}

/// A pull request the user should see. Keyed by
/// `host:repo#number`, computed via [`Pr::make_id`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pr {
    pub id: String,
    pub host: String,
    pub repo: String,
    pub number: u64,
    pub title: String,
    pub url: String,
    pub author: String,
    pub role: PrRole,
    pub state: PrState,
    pub reason: PrReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ci_status: Option<CiStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mergeable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mergeable_state: Option<String>,
    pub head_branch: String,
    pub head_sha: String,
    pub comment_count: u64,
    pub approved_by_me: bool,
    pub muted: bool,
    pub details_fetched: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details_fetched_at: Option<u64>,
    pub last_updated: u64,
    pub last_polled: u64,
    pub has_new_changes: bool,
    pub heat_state: HeatState,
    pub last_heat_activity_at: u64,
}

impl Pr {
    pub fn make_id(host: &str, repo: &str, number: u64) -> String {
        format!("{host}:{repo}#{number}")
    }

    /// Map a code-host `mergeable_state` string to a `CiStatus`.
    pub fn ci_status_from_mergeable_state(mergeable_state: &str) -> CiStatus {
        match mergeable_state {
            "clean" => CiStatus::Success,
            "blocked" | "unstable" => CiStatus::Pending,
            "dirty" => CiStatus::Failure,
            _ => CiStatus::None,
        }
    }
}

/// `{repo, muted, collapsed}`. Present iff a session or PR
/// references it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repo {
    pub repo: String,
    pub muted: bool,
    pub collapsed: bool,
}

/// `{author, muted}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Author {
    pub author: String,
    pub muted: bool,
}

/// Ephemeral, ordered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Warning {
    pub code: String,
    pub message: String,
    pub at: u64,
}

/// `{resource, remaining, reset_at}`, ephemeral, one
/// per host+resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitInfo {
    pub host: String,
    pub resource: String,
    pub remaining: i64,
    pub reset_at: u64,
}

/// Policy knobs exposed as runtime-adjustable settings rather than
/// hardcoded constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub heat_warm_after_secs: u64,
    pub heat_cold_after_secs: u64,
    pub poll_interval_secs: u64,
    pub testing_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            heat_warm_after_secs: 6 * 3600,
            heat_cold_after_secs: 24 * 3600,
            poll_interval_secs: 60,
            testing_enabled: false,
        }
    }
}
