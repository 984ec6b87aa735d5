// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::AgentRules;

/// Signature rules for the `claude` agent.
///
/// Seed signatures only: the box-drawing confirm
/// prompt Claude renders before a sensitive tool call, and its idle prompt
/// arrow. These are not derived from a captured transcript corpus and
/// should be replaced once one is available.
pub struct ClaudeRules {
    approval: regex::Regex,
    waiting: regex::Regex,
}

impl ClaudeRules {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            approval: regex::Regex::new(
                r"(?i)do you want to proceed\?|allow this|yes,? and don'?t ask again|1\.\s*yes",
            )?,
            waiting: regex::Regex::new(r"^\s*>\s*$|^\s*│\s*>\s*│?\s*$")?,
        })
    }
}

impl AgentRules for ClaudeRules {
    fn name(&self) -> &'static str {
        "claude"
    }

    fn matches_pending_approval(&self, window: &[&str]) -> bool {
        window.iter().any(|l| self.approval.is_match(l))
    }

    fn matches_waiting_input(&self, window: &[&str]) -> bool {
        window.iter().rev().take(3).any(|l| self.waiting.is_match(l))
    }
}
