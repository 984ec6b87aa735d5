// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::classifier::ClassifierConfig;

fn cfg() -> ClassifierConfig {
    ClassifierConfig { t_launch_ms: 50, t_idle_ms: 200, ..ClassifierConfig::default() }
}

#[test]
fn starts_launching() {
    let c = Classifier::new("codex", cfg(), 0).unwrap();
    assert_eq!(c.state(), SessionState::Launching);
}

#[test]
fn becomes_working_after_launch_window_with_no_content() {
    let mut c = Classifier::new("codex", cfg(), 0).unwrap();
    let t = c.tick(100).unwrap();
    assert_eq!(t.state, SessionState::Working);
}

#[test]
fn shell_prompt_is_idle_signature_for_codex() {
    let mut c = Classifier::new("codex", cfg(), 0).unwrap();
    let t = c.feed(b"$ ", 10).unwrap();
    assert_eq!(t.state, SessionState::Idle);
}

#[test]
fn codex_own_prompt_is_waiting_input() {
    let mut c = Classifier::new("codex", cfg(), 0).unwrap();
    let t = c.feed(b"codex> ", 10).unwrap();
    assert_eq!(t.state, SessionState::WaitingInput);
}

#[test]
fn approval_prompt_outranks_idle_signature() {
    let mut c = Classifier::new("codex", cfg(), 0).unwrap();
    c.feed(b"Do you want to continue? [y/N] ", 10);
    let t = c.feed(b"$ ", 20).unwrap();
    // window now contains both lines; approval must win priority order.
    assert_eq!(t.state, SessionState::PendingApproval);
}

#[test]
fn state_change_bumps_state_since_unchanged_reevaluation_does_not() {
    let mut c = Classifier::new("codex", cfg(), 0).unwrap();
    let t1 = c.feed(b"$ ", 10).unwrap();
    assert_eq!(t1.state_since, 10);
    let t2 = c.feed(b"", 20).unwrap();
    assert_eq!(t2.state, SessionState::Idle);
    assert_eq!(t2.state_since, 10, "re-evaluation to the same state must not bump state_since");
    assert_eq!(t2.state_updated_at, 20, "state_updated_at always advances");
}

#[test]
fn decays_to_idle_after_quiet_period() {
    let mut c = Classifier::new("codex", cfg(), 0).unwrap();
    c.feed(b"some output\n", 10);
    let t = c.tick(1000).unwrap();
    assert_eq!(t.state, SessionState::Idle);
}

#[test]
fn deterministic_given_same_transcript() {
    let chunks: Vec<(&[u8], u64)> =
        vec![(b"starting up\n", 0), (b"Do you want to continue? [y/N] ", 60), (b"$ ", 120)];

    let run = || {
        let mut c = Classifier::new("codex", cfg(), 0).unwrap();
        chunks.iter().map(|(data, t)| c.feed(data, *t).unwrap().state).collect::<Vec<_>>()
    };

    assert_eq!(run(), run());
}

#[test]
fn resize_does_not_panic_and_preserves_state() {
    let mut c = Classifier::new("codex", cfg(), 0).unwrap();
    c.feed(b"$ ", 10);
    c.resize(120, 40);
    let t = c.tick(15).unwrap();
    assert_eq!(t.state, SessionState::Idle);
}
