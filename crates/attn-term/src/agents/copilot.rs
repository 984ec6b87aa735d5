// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::AgentRules;

/// Signature rules for the `copilot` agent.
pub struct CopilotRules {
    approval: regex::Regex,
    waiting: regex::Regex,
}

impl CopilotRules {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            approval: regex::Regex::new(r"(?i)allow this action\?|\(y\)es.*\(n\)o")?,
            waiting: regex::Regex::new(r"^\s*copilot>\s*$|^\s*>\s*$")?,
        })
    }
}

impl AgentRules for CopilotRules {
    fn name(&self) -> &'static str {
        "copilot"
    }

    fn matches_pending_approval(&self, window: &[&str]) -> bool {
        window.iter().any(|l| self.approval.is_match(l))
    }

    fn matches_waiting_input(&self, window: &[&str]) -> bool {
        window.last().is_some_and(|l| self.waiting.is_match(l))
    }
}
