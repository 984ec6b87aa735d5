// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terminal state classifier.
//!
//! Maintains a virtual-terminal screen with a bounded scrollback and
//! classifies the session's lifecycle state from the rendered output.
//! Classification takes an explicit logical timestamp rather than reading
//! the clock, so a captured transcript reproduces the same sequence of
//! transitions on every run.

pub mod agents;
mod classifier;
mod rules;
mod screen;

pub use classifier::{Classifier, ClassifierConfig};
pub use rules::AgentRules;
pub use screen::{CursorPosition, Screen, ScreenSnapshot};

use serde::{Deserialize, Serialize};

/// Session lifecycle state.
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

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Launching => "launching",
            Self::Working => "working",
            Self::WaitingInput => "waiting_input",
            Self::PendingApproval => "pending_approval",
            Self::Idle => "idle",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reported state change, timestamped with the logical clock supplied to `feed`.
#[derive(Debug, Clone, PartialEq)]
pub struct StateTransition {
    pub state: SessionState,
    pub cause: String,
    /// When the *current* state began. Only bumped when `state` actually changes.
    pub state_since: u64,
    /// When this evaluation ran. Always bumped.
    pub state_updated_at: u64,
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
