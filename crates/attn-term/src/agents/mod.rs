// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

mod claude;
mod codex;
mod copilot;

pub use claude::ClaudeRules;
pub use codex::CodexRules;
pub use copilot::CopilotRules;

use crate::AgentRules;

/// Resolve the signature ruleset for a known agent name, falling back to a
/// permissive generic ruleset for anything else.
///
/// The exact per-agent regexes are policy captured from real transcripts
///; these are reasonable seed signatures, not a
/// claim of exhaustiveness. Returns an error only if a pattern fails to
/// compile, which would indicate a typo in one of the literals below.
pub fn rules_for(agent: &str) -> anyhow::Result<Box<dyn AgentRules>> {
    Ok(match agent {
        "claude" => Box::new(ClaudeRules::new()?),
        "codex" => Box::new(CodexRules::new()?),
        "copilot" => Box::new(CopilotRules::new()?),
        _ => Box::new(GenericRules::new()?),
    })
}

/// Fallback ruleset for unrecognized agents: a bare shell prompt for
/// waiting-input, and the common `[y/N]`-style confirmation for approval.
struct GenericRules {
    approval: regex::Regex,
    waiting: regex::Regex,
}

impl GenericRules {
    fn new() -> anyhow::Result<Self> {
        Ok(Self {
            approval: regex::Regex::new(r"(?i)\[y/n\]\s*$|proceed\?|continue\?")?,
            waiting: regex::Regex::new(r"^\s*[$>#]\s*$")?,
        })
    }
}

impl AgentRules for GenericRules {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn matches_pending_approval(&self, window: &[&str]) -> bool {
        window.iter().any(|l| self.approval.is_match(l))
    }

    fn matches_waiting_input(&self, window: &[&str]) -> bool {
        window.last().is_some_and(|l| self.waiting.is_match(l))
    }
}
