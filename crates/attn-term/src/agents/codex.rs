// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::AgentRules;

/// Signature rules for the `codex` agent.
pub struct CodexRules {
    approval: regex::Regex,
    waiting: regex::Regex,
    idle: regex::Regex,
}

impl CodexRules {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            approval: regex::Regex::new(r"(?i)\[y/n\]\s*$|run this command\?|approve\?")?,
            waiting: regex::Regex::new(r"^\s*codex>\s*$")?,
            idle: regex::Regex::new(r"^\s*\$\s*$")?,
        })
    }
}

impl AgentRules for CodexRules {
    fn name(&self) -> &'static str {
        "codex"
    }

    fn matches_pending_approval(&self, window: &[&str]) -> bool {
        window.iter().any(|l| self.approval.is_match(l))
    }

    fn matches_waiting_input(&self, window: &[&str]) -> bool {
        window.last().is_some_and(|l| self.waiting.is_match(l))
    }

    /// A bare shell prompt means codex has exited back to the shell:
    /// nothing is pending, unlike its own `codex>` prompt.
    fn matches_idle(&self, window: &[&str]) -> bool {
        window.last().is_some_and(|l| self.idle.is_match(l))
    }
}
