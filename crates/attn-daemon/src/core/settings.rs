// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Settings and test-injection command handlers. `SetSetting`
//! is the one place a client can rewrite persisted daemon config; the two
//! `inject_test_*` commands exist purely so an attached test harness can
//! populate the core without a real worker or code host, and are refused
//! unless `settings.testing_enabled` is set (spec Open Question: test
//! injection is opt-in at runtime, not compiled out, so a daemon can be
//! flipped into test mode without a rebuild).

use tokio::sync::oneshot;

use super::Core;
use crate::domain::{Pr, Session};
use crate::error::DaemonError;
use crate::protocol::Event;

impl Core {
    pub(super) fn cmd_set_setting(&mut self, key: String, value: serde_json::Value, reply: oneshot::Sender<Result<Event, DaemonError>>) {
        macro_rules! apply {
            ($field:ident, $kind:literal) => {
                match serde_json::from_value(value) {
                    Ok(parsed) => self.settings.$field = parsed,
                    Err(_) => {
                        let _ = reply.send(Err(DaemonError::validation(format!("{key}: expected {}", $kind))));
                        return;
                    }
                }
            };
        }

        match key.as_str() {
            "heat_warm_after_secs" => apply!(heat_warm_after_secs, "u64"),
            "heat_cold_after_secs" => apply!(heat_cold_after_secs, "u64"),
            "poll_interval_secs" => apply!(poll_interval_secs, "u64"),
            "testing_enabled" => apply!(testing_enabled, "bool"),
            _ => {
                let _ = reply.send(Err(DaemonError::validation(format!("unknown setting: {key}"))));
                return;
            }
        }

        if let Err(e) = self.store.save_settings(&self.settings) {
            let _ = reply.send(Err(e));
            return;
        }
        let _ = self.settings_tx.send(self.settings.clone());
        self.broadcast(Event::SettingsUpdated { settings: self.settings.clone() });
        let _ = reply.send(Ok(Event::SettingsResult { settings: self.settings.clone() }));
    }

    pub(super) fn cmd_inject_test_pr(&mut self, pr: Pr, reply: oneshot::Sender<Result<Event, DaemonError>>) {
        if !self.settings.testing_enabled {
            let _ = reply.send(Err(DaemonError::permanent("testing_enabled is off")));
            return;
        }
        self.prs.insert(pr.id.clone(), pr);
        self.sync_repos_and_authors();
        self.broadcast(Event::PrsUpdated { prs: self.prs_snapshot() });
        let _ = reply.send(Ok(Event::Ack));
    }

    pub(super) fn cmd_inject_test_session(&mut self, session: Session, reply: oneshot::Sender<Result<Event, DaemonError>>) {
        if !self.settings.testing_enabled {
            let _ = reply.send(Err(DaemonError::permanent("testing_enabled is off")));
            return;
        }
        self.sessions.insert(session.id.clone(), session);
        self.broadcast(Event::SessionsUpdated { sessions: self.sessions_snapshot() });
        let _ = reply.send(Ok(Event::Ack));
    }
}
