// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn feed_updates_sequence_and_lines() {
    let mut s = Screen::new(10, 3);
    assert_eq!(s.seq(), 0);
    s.feed(b"hi");
    assert_eq!(s.seq(), 1);
    let snap = s.snapshot();
    assert_eq!(snap.lines[0].trim_end(), "hi");
}

#[test]
fn tracks_alt_screen_toggle() {
    let mut s = Screen::new(10, 3);
    assert!(!s.is_alt_screen());
    s.feed(b"\x1b[?1049h");
    assert!(s.is_alt_screen());
    s.feed(b"\x1b[?1049l");
    assert!(!s.is_alt_screen());
}

#[test]
fn alt_screen_toggle_split_across_feeds_is_still_detected() {
    let mut s = Screen::new(10, 3);
    s.feed(b"\x1b[?10");
    s.feed(b"49h");
    assert!(s.is_alt_screen());
}

#[test]
fn split_utf8_sequence_across_feeds_decodes_correctly() {
    let mut s = Screen::new(10, 3);
    let bytes = "é".as_bytes().to_vec();
    s.feed(&bytes[..1]);
    s.feed(&bytes[1..]);
    let snap = s.snapshot();
    assert!(snap.lines[0].contains('é'));
}

#[test]
fn scrollback_is_capped() {
    let mut s = Screen::with_scrollback(10, 2, 3);
    for i in 0..10 {
        s.feed(format!("line{i}\n").as_bytes());
    }
    assert!(s.scrollback_tail(100).len() <= 3);
}

#[test]
fn resize_changes_grid_dimensions() {
    let mut s = Screen::new(10, 3);
    s.resize(20, 5);
    let snap = s.snapshot();
    assert_eq!(snap.cols, 20);
    assert_eq!(snap.rows, 5);
}

#[test]
fn changed_flag_clears() {
    let mut s = Screen::new(10, 3);
    s.feed(b"x");
    assert!(s.changed());
    s.clear_changed();
    assert!(!s.changed());
}
