// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PR poller & heat tracker. Drives the code-host client
//! registry on a jittered cadence, merges the three per-host searches,
//! diffs against the previous cycle to flag `has_new_changes`, and computes
//! heat-state decay before handing the resulting snapshot to the attention
//! core as a single `CoreEvent::PrsRefreshed`.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::domain::{CiStatus, HeatState, Pr, PrReason, PrRole, PrState, Settings};
use crate::hostclient::{ClientRegistry, RawPr};
use crate::protocol::CoreEvent;

const RATE_LIMIT_RESOURCE: &str = "search";

/// Per-PR bookkeeping the poller carries cycle to cycle. None of this is
/// visible outside the poller; the attention core only ever sees the `Pr`
/// snapshot built from it.
#[derive(Clone)]
struct ShadowPr {
    head_sha: String,
    comment_count: u64,
    heat_state: HeatState,
    last_heat_activity_at: u64,
    first_seen_at: u64,
}

pub struct Poller {
    registry: std::sync::Arc<ClientRegistry>,
    core_tx: mpsc::UnboundedSender<CoreEvent>,
    settings: watch::Receiver<Settings>,
    shadow: Mutex<HashMap<String, ShadowPr>>,
    rate_limited_hosts: Mutex<HashSet<String>>,
    stop: CancellationToken,
}

impl Poller {
    pub fn new(
        registry: std::sync::Arc<ClientRegistry>,
        core_tx: mpsc::UnboundedSender<CoreEvent>,
        settings: watch::Receiver<Settings>,
    ) -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self {
            registry,
            core_tx,
            settings,
            shadow: Mutex::new(HashMap::new()),
            rate_limited_hosts: Mutex::new(HashSet::new()),
            stop: CancellationToken::new(),
        })
    }

    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    /// Runs the poll loop until `stop_token()` is cancelled. Spawn this on
    /// its own task; it never returns otherwise.
    pub async fn run(self: std::sync::Arc<Self>) {
        loop {
            if self.stop.is_cancelled() {
                return;
            }
            self.poll_once().await;

            let base = Duration::from_secs(self.settings.borrow().poll_interval_secs.max(1));
            let jittered = jitter(base);
            tokio::select! {
                _ = self.stop.cancelled() => return,
                _ = tokio::time::sleep(jittered) => {}
            }
        }
    }

    /// Runs exactly one poll cycle: fetch, merge, diff, and publish. Exposed
    /// directly so tests (and an eventual `refresh_prs` command) can trigger
    /// a cycle on demand without waiting for the timer.
    pub async fn poll_once(&self) {
        let (raw, err) = self.registry.fetch_all_prs().await;
        if let Some(err) = err {
            let _ = self.core_tx.send(CoreEvent::PollWarning { code: "host_fetch_failed".into(), message: err.to_string() });
        }

        self.report_rate_limit_transitions().await;

        let now = crate::domain::epoch_ms() / 1000;
        let settings = self.settings.borrow().clone();
        let prs = self.merge(raw, now, &settings);
        let _ = self.core_tx.send(CoreEvent::PrsRefreshed { prs });
    }

    /// Broadcasts `CoreEvent::RateLimited` exactly once per host transition
    /// into the limited state for [`RATE_LIMIT_RESOURCE`]; hosts that clear
    /// the limit are dropped from the tracked set so a later re-entry emits
    /// again.
    async fn report_rate_limit_transitions(&self) {
        let limited = self.registry.get_rate_limited_hosts(RATE_LIMIT_RESOURCE).await;
        let now_limited: HashSet<String> = limited.iter().map(|(host, _)| host.clone()).collect();

        let newly_limited: Vec<(String, u64)> = {
            let mut prior = self.rate_limited_hosts.lock();
            let fresh: Vec<(String, u64)> = limited.into_iter().filter(|(host, _)| !prior.contains(host)).collect();
            *prior = now_limited;
            fresh
        };

        for (host, reset_at) in newly_limited {
            let _ = self.core_tx.send(CoreEvent::RateLimited { host, resource: RATE_LIMIT_RESOURCE.to_owned(), reset_at });
        }
    }

    fn merge(&self, raw: Vec<RawPr>, now: u64, settings: &Settings) -> Vec<Pr> {
        let mut shadow = self.shadow.lock();
        let seen_ids: std::collections::HashSet<String> = raw.iter().map(|pr| Pr::make_id(&pr.host, &pr.repo, pr.number)).collect();
        shadow.retain(|id, _| seen_ids.contains(id));

        let mut out = Vec::with_capacity(raw.len());
        for item in raw {
            let id = Pr::make_id(&item.host, &item.repo, item.number);
            let role = item.role;
            let prev = shadow.get(&id).cloned();
            let had_change = match &prev {
                Some(prev) => prev.head_sha != item.head_sha || prev.comment_count != item.comment_count,
                None => false,
            };

            let prior_heat = prev.as_ref().map(|p| p.heat_state).unwrap_or(HeatState::Hot);
            let prior_activity = prev.as_ref().map(|p| p.last_heat_activity_at).unwrap_or(now);
            let (heat_state, last_heat_activity_at) =
                advance_heat(prior_heat, prior_activity, now, had_change, settings.heat_warm_after_secs, settings.heat_cold_after_secs);
            let first_seen_at = prev.as_ref().map(|p| p.first_seen_at).unwrap_or(now);

            shadow.insert(
                id.clone(),
                ShadowPr {
                    head_sha: item.head_sha.clone(),
                    comment_count: item.comment_count,
                    heat_state,
                    last_heat_activity_at,
                    first_seen_at,
                },
            );

            out.push(Pr {
                id,
                host: item.host,
                repo: item.repo,
                number: item.number,
                title: item.title,
                url: item.url,
                author: item.author,
                role,
                state: PrState::Waiting,
                reason: PrReason::ReviewNeeded,
                ci_status: Some(CiStatus::None),
                review_status: None,
                mergeable: None,
                mergeable_state: None,
                head_branch: item.head_branch,
                head_sha: item.head_sha,
                comment_count: item.comment_count,
                approved_by_me: item.seen_via_reviewed_by_only,
                muted: false,
                details_fetched: false,
                details_fetched_at: None,
                last_updated: if had_change || prev.is_none() { now } else { prev.map(|_| now).unwrap_or(first_seen_at) },
                last_polled: now,
                has_new_changes: had_change,
                heat_state,
                last_heat_activity_at,
            });
        }
        out
    }
}

/// Heat decay: a detected change always jumps to hot. Otherwise
/// it decays warm → cold strictly by elapsed time since the last activity.
fn advance_heat(current: HeatState, last_activity_at: u64, now: u64, had_change: bool, warm_after_secs: u64, cold_after_secs: u64) -> (HeatState, u64) {
    if had_change {
        return (HeatState::Hot, now);
    }
    let elapsed = now.saturating_sub(last_activity_at);
    let state = match current {
        HeatState::Hot if elapsed >= warm_after_secs => HeatState::Warm,
        HeatState::Warm if elapsed >= cold_after_secs => HeatState::Cold,
        HeatState::Hot if elapsed >= cold_after_secs => HeatState::Cold,
        other => other,
    };
    (state, last_activity_at)
}

fn jitter(base: Duration) -> Duration {
    let factor = rand::rng().random_range(0.85..1.15);
    Duration::from_secs_f64(base.as_secs_f64() * factor)
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
