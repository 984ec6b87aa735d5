// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The rule-based classifier.
//!
//! `Classifier::feed` is pure given its inputs: the caller supplies the
//! logical timestamp, so replaying a captured transcript with the same byte
//! chunks and timestamps reproduces the same sequence of transitions.
//! Priority order is fixed: `pending_approval` > `waiting_input` > `idle`
//! (signature) > `launching` > `working`, with `idle` also reachable as a
//! time-based decay and `unknown` reserved for "classifier gave up".

use crate::agents::rules_for;
use crate::rules::signature_window;
use crate::screen::{Screen, DEFAULT_SCROLLBACK_LINES};
use crate::{AgentRules, SessionState, StateTransition};

/// Number of consecutive replacement characters (`\u{FFFD}`) across the most
/// recent feed that flips the classifier into `unknown`. A handful of
/// mis-decoded bytes is normal UTF-8 boundary noise; a wall of them means the
/// stream is not really text (or our escape handling has come unglued).
const UNDECODED_GIVE_UP_THRESHOLD: usize = 64;

#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub cols: u16,
    pub rows: u16,
    pub scrollback_lines: usize,
    /// No non-blank content for at least this long (ms) since the session
    /// started reads as `launching`.
    pub t_launch_ms: u64,
    /// No bytes received for at least this long (ms) decays the state to
    /// `idle`, regardless of what the last rule match was.
    pub t_idle_ms: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            cols: 80,
            rows: 24,
            scrollback_lines: DEFAULT_SCROLLBACK_LINES,
            t_launch_ms: 2_000,
            t_idle_ms: 120_000,
        }
    }
}

/// A bounded virtual terminal plus the agent-aware rules that turn its
/// rendered content into a [`SessionState`].
pub struct Classifier {
    screen: Screen,
    rules: Box<dyn AgentRules>,
    config: ClassifierConfig,
    state: SessionState,
    state_since: u64,
    state_updated_at: u64,
    /// Logical time of session creation, used for the `launching` heuristic.
    started_at: u64,
    /// Logical time of the most recent `feed` call with non-empty bytes.
    last_byte_at: u64,
    /// True once any non-blank content has been observed.
    seen_content: bool,
}

impl Classifier {
    pub fn new(agent: &str, config: ClassifierConfig, now: u64) -> anyhow::Result<Self> {
        let rules = rules_for(agent)?;
        let screen = Screen::with_scrollback(config.cols, config.rows, config.scrollback_lines);
        Ok(Self {
            screen,
            rules,
            config,
            state: SessionState::Launching,
            state_since: now,
            state_updated_at: now,
            started_at: now,
            last_byte_at: now,
            seen_content: false,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn state_since(&self) -> u64 {
        self.state_since
    }

    pub fn state_updated_at(&self) -> u64 {
        self.state_updated_at
    }

    pub fn screen(&self) -> &Screen {
        &self.screen
    }

    pub fn resize(&mut self, cols: u16, rows: u16) {
        self.screen.resize(cols, rows);
    }

    /// Feed a chunk of PTY bytes at logical time `now` (milliseconds).
    /// Returns `Some` only when the state changed or this is a re-evaluation
    /// worth reporting (the caller decides whether to re-evaluate on a
    /// timer even with no new bytes, for the idle decay).
    pub fn feed(&mut self, data: &[u8], now: u64) -> Option<StateTransition> {
        if !data.is_empty() {
            self.screen.feed(data);
            self.last_byte_at = now;
            if self.screen.snapshot().lines.iter().any(|l| !l.trim().is_empty()) {
                self.seen_content = true;
            }
        }
        self.evaluate(now)
    }

    /// Re-evaluate the current state against the clock without feeding new
    /// bytes. Used to detect the idle decay when the PTY has gone quiet.
    pub fn tick(&mut self, now: u64) -> Option<StateTransition> {
        self.evaluate(now)
    }

    fn evaluate(&mut self, now: u64) -> Option<StateTransition> {
        let next = self.classify(now);
        self.transition_to(next, now)
    }

    fn classify(&self, now: u64) -> SessionState {
        let snapshot = self.screen.snapshot();
        let window = signature_window(&snapshot.lines);

        let undecoded = snapshot
            .lines
            .iter()
            .map(|l| l.matches('\u{FFFD}').count())
            .sum::<usize>();
        if undecoded >= UNDECODED_GIVE_UP_THRESHOLD {
            return SessionState::Unknown;
        }

        if self.rules.matches_pending_approval(&window) {
            return SessionState::PendingApproval;
        }
        if self.rules.matches_waiting_input(&window) {
            return SessionState::WaitingInput;
        }
        if self.rules.matches_idle(&window) {
            return SessionState::Idle;
        }
        if !self.seen_content && now.saturating_sub(self.started_at) < self.config.t_launch_ms {
            return SessionState::Launching;
        }
        if now.saturating_sub(self.last_byte_at) >= self.config.t_idle_ms {
            return SessionState::Idle;
        }
        SessionState::Working
    }

    /// Apply `next` as the freshly computed state at `now`, always returning
    /// a transition: callers that only care about actual state changes can
    /// compare `state_since` against the value they already hold.
    fn transition_to(&mut self, next: SessionState, now: u64) -> Option<StateTransition> {
        if next != self.state {
            self.state = next;
            self.state_since = now;
        }
        self.state_updated_at = now;
        Some(StateTransition {
            state: self.state,
            cause: next.as_str().to_string(),
            state_since: self.state_since,
            state_updated_at: self.state_updated_at,
        })
    }
}
