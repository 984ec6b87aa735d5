// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded buffer of recently emitted [`OutputEvent`]s, so a reattaching
//! `watch{from_seq}` can replay what it missed or be
//! told it can't (point iii, `desync`).

use std::collections::VecDeque;

use attn_wire::OutputEvent;

pub struct EventRing {
    events: VecDeque<OutputEvent>,
    capacity: usize,
    last_seq: u64,
}

impl EventRing {
    pub fn new(capacity: usize) -> Self {
        Self { events: VecDeque::with_capacity(capacity.min(1024)), capacity, last_seq: 0 }
    }

    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }

    /// Append an event, assigning and returning its sequence number. `seq`
    /// is strictly monotonic per session.
    pub fn push(&mut self, build: impl FnOnce(u64) -> OutputEvent) -> OutputEvent {
        self.last_seq += 1;
        let event = build(self.last_seq);
        self.events.push_back(event.clone());
        while self.events.len() > self.capacity {
            self.events.pop_front();
        }
        event
    }

    /// Events with `seq > from_seq`, or `None` if the ring no longer holds
    /// the start of that range (the caller must emit `desync` instead).
    pub fn replay_from(&self, from_seq: u64) -> Option<Vec<OutputEvent>> {
        if from_seq > self.last_seq {
            return None;
        }
        let oldest_held = self.events.front().and_then(|e| e.seq()).unwrap_or(self.last_seq + 1);
        if from_seq < oldest_held.saturating_sub(1) {
            return None;
        }
        Some(self.events.iter().filter(|e| e.seq().is_some_and(|s| s > from_seq)).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(seq: u64) -> OutputEvent {
        OutputEvent::Output { seq, data: vec![seq as u8] }
    }

    #[test]
    fn seq_is_monotonic() {
        let mut ring = EventRing::new(10);
        let e1 = ring.push(|seq| output(seq));
        let e2 = ring.push(|seq| output(seq));
        assert_eq!(e1.seq(), Some(1));
        assert_eq!(e2.seq(), Some(2));
    }

    #[test]
    fn replay_from_returns_events_after_seq() {
        let mut ring = EventRing::new(10);
        for _ in 0..5 {
            ring.push(output);
        }
        let replayed = ring.replay_from(2).expect("should have range");
        assert_eq!(replayed.len(), 3);
        assert_eq!(replayed[0].seq(), Some(3));
    }

    #[test]
    fn replay_from_none_when_evicted() {
        let mut ring = EventRing::new(3);
        for _ in 0..10 {
            ring.push(output);
        }
        assert!(ring.replay_from(1).is_none(), "seq 1 should have been evicted long ago");
    }

    #[test]
    fn replay_from_current_seq_is_empty_but_not_desynced() {
        let mut ring = EventRing::new(10);
        ring.push(output);
        ring.push(output);
        let replayed = ring.replay_from(2).expect("at current seq, not desynced");
        assert!(replayed.is_empty());
    }
}
