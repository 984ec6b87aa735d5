// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent-specific classification rules.
//!
//! Each agent contributes a set of regexp signatures evaluated over a fixed
//! last-N-lines window of the rendered screen. Rules are agent-aware because
//! different coding agents render distinct prompts for the same underlying
//! state (a shell `$ ` vs. a TUI's `>` marker, a y/N confirmation vs. a
//! numbered option list).

/// Number of trailing non-empty screen lines considered by signature rules.
pub const SIGNATURE_WINDOW: usize = 12;

/// Per-agent signature rules consulted by the classifier in priority order:
/// `pending_approval` is checked first, then `waiting_input`, then `idle`;
/// `launching` and `working` are computed by the classifier itself from
/// blank-content duration rather than per-agent signatures.
pub trait AgentRules: Send + Sync {
    fn name(&self) -> &'static str;

    /// True if the window matches this agent's "asking for approval before
    /// acting" signature (e.g. `Do you want to continue? [y/N]`).
    fn matches_pending_approval(&self, window: &[&str]) -> bool;

    /// True if the window matches this agent's own "waiting for the next
    /// instruction" prompt (e.g. a TUI's `>` marker) — the agent is still
    /// attached and actively prompting the user, distinct from having
    /// exited back to a plain shell.
    fn matches_waiting_input(&self, window: &[&str]) -> bool;

    /// True if the window matches a signature that means the agent is done
    /// and nothing is pending (e.g. a bare shell prompt left behind after
    /// the agent process exits). Defaults to no such signature.
    fn matches_idle(&self, _window: &[&str]) -> bool {
        false
    }
}

/// Extract the last `SIGNATURE_WINDOW` non-empty lines from a rendered screen,
/// most recent last — the window every [`AgentRules`] impl is evaluated against.
pub fn signature_window(lines: &[String]) -> Vec<&str> {
    lines
        .iter()
        .map(|l| l.trim_end())
        .filter(|l| !l.trim().is_empty())
        .rev()
        .take(SIGNATURE_WINDOW)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect()
}
