// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PR/repo/author command handlers. `refresh_prs`,
//! `fetch_pr_details`, `approve_pr`, and `merge_pr` all reach a code host over
//! HTTP and are offloaded to a spawned task so the core loop never blocks on
//! the network; the rest are in-memory map edits.

use std::sync::Arc;

use tokio::sync::oneshot;

use super::Core;
use crate::domain::{CiStatus, Pr};
use crate::error::DaemonError;
use crate::protocol::{CoreEvent, Event};

/// Splits a PR id of the form `host:repo#number` (see `Pr::make_id`) back
/// into its parts.
fn split_pr_id(id: &str) -> Result<(String, String, u64), DaemonError> {
    let (host, rest) = id.split_once(':').ok_or_else(|| DaemonError::validation(format!("malformed pr id: {id}")))?;
    let (repo, number) = rest.rsplit_once('#').ok_or_else(|| DaemonError::validation(format!("malformed pr id: {id}")))?;
    let number: u64 = number.parse().map_err(|_| DaemonError::validation(format!("malformed pr id: {id}")))?;
    Ok((host.to_owned(), repo.to_owned(), number))
}

impl Core {
    pub(super) async fn cmd_refresh_prs(&mut self, reply: oneshot::Sender<Result<Event, DaemonError>>) {
        if self.hostclients.is_any_host_rate_limited("search").await {
            let _ = reply.send(Err(DaemonError::transient("refresh_prs: a code host is rate limited")));
            return;
        }
        let poller = Arc::clone(&self.poller);
        tokio::spawn(async move {
            poller.poll_once().await;
        });
        let _ = reply.send(Ok(Event::Ack));
    }

    pub(super) async fn cmd_fetch_pr_details(&mut self, id: String, reply: oneshot::Sender<Result<Event, DaemonError>>) {
        let (host, repo, number) = match split_pr_id(&id) {
            Ok(parts) => parts,
            Err(e) => {
                let _ = reply.send(Err(e));
                return;
            }
        };
        let Some(client) = self.hostclients.get(&host).await else {
            let _ = reply.send(Err(DaemonError::not_found(format!("unknown host {host}"))));
            return;
        };
        let core_tx = self.core_tx.clone();
        tokio::spawn(async move {
            match client.fetch_pr_detail(&repo, number).await {
                Ok((head_sha, head_branch, mergeable_state)) => {
                    let ci_status = mergeable_state.as_deref().map(Pr::ci_status_from_mergeable_state).unwrap_or(CiStatus::None);
                    let _ = reply.send(Ok(Event::PrDetailsResult {
                        id: id.clone(),
                        head_sha: head_sha.clone(),
                        head_branch: head_branch.clone(),
                        ci_status,
                    }));
                    let _ = core_tx.send(CoreEvent::PrDetailsFetched { id, head_sha, head_branch, ci_status });
                }
                Err(e) => {
                    let _ = reply.send(Err(e));
                }
            }
        });
    }

    pub(super) async fn cmd_approve_pr(&mut self, id: String, reply: oneshot::Sender<Result<Event, DaemonError>>) {
        let (host, repo, number) = match split_pr_id(&id) {
            Ok(parts) => parts,
            Err(e) => {
                let _ = reply.send(Err(e));
                return;
            }
        };
        let hostclients = Arc::clone(&self.hostclients);
        tokio::spawn(async move {
            let result = hostclients.approve_pr(&host, &repo, number).await;
            let _ = reply.send(result.map(|_| Event::Ack));
        });
    }

    pub(super) async fn cmd_merge_pr(&mut self, id: String, reply: oneshot::Sender<Result<Event, DaemonError>>) {
        let (host, repo, number) = match split_pr_id(&id) {
            Ok(parts) => parts,
            Err(e) => {
                let _ = reply.send(Err(e));
                return;
            }
        };
        let hostclients = Arc::clone(&self.hostclients);
        tokio::spawn(async move {
            let result = hostclients.merge_pr(&host, &repo, number).await;
            let _ = reply.send(result.map(|_| Event::Ack));
        });
    }

    pub(super) async fn cmd_pr_visited(&mut self, id: String, reply: oneshot::Sender<Result<Event, DaemonError>>) {
        let Some(pr) = self.prs.get_mut(&id) else {
            let _ = reply.send(Err(DaemonError::not_found(format!("unknown pr {id}"))));
            return;
        };
        pr.has_new_changes = false;
        self.broadcast(Event::PrsUpdated { prs: self.prs_snapshot() });
        let _ = reply.send(Ok(Event::Ack));
    }

    pub(super) async fn cmd_mute_pr(&mut self, id: String, muted: bool, reply: oneshot::Sender<Result<Event, DaemonError>>) {
        let Some(pr) = self.prs.get_mut(&id) else {
            let _ = reply.send(Err(DaemonError::not_found(format!("unknown pr {id}"))));
            return;
        };
        pr.muted = muted;
        self.broadcast(Event::PrsUpdated { prs: self.prs_snapshot() });
        let _ = reply.send(Ok(Event::Ack));
    }

    pub(super) async fn cmd_mute_repo(&mut self, repo: String, muted: bool, reply: oneshot::Sender<Result<Event, DaemonError>>) {
        let entry = self.repos.entry(repo.clone()).or_insert_with(|| crate::domain::Repo { repo: repo.clone(), muted: false, collapsed: false });
        entry.muted = muted;
        if let Err(e) = self.persist_repo_state() {
            let _ = reply.send(Err(e));
            return;
        }
        self.broadcast(Event::ReposUpdated { repos: self.repos_snapshot() });
        let _ = reply.send(Ok(Event::Ack));
    }

    pub(super) async fn cmd_mute_author(&mut self, author: String, muted: bool, reply: oneshot::Sender<Result<Event, DaemonError>>) {
        let entry = self.authors.entry(author.clone()).or_insert_with(|| crate::domain::Author { author: author.clone(), muted: false });
        entry.muted = muted;
        let snapshot: std::collections::HashMap<String, bool> = self.authors.iter().map(|(k, v)| (k.clone(), v.muted)).collect();
        if let Err(e) = self.store.save_authors(&snapshot) {
            let _ = reply.send(Err(e));
            return;
        }
        self.broadcast(Event::AuthorsUpdated { authors: self.authors_snapshot() });
        let _ = reply.send(Ok(Event::Ack));
    }

    pub(super) async fn cmd_collapse_repo(&mut self, repo: String, collapsed: bool, reply: oneshot::Sender<Result<Event, DaemonError>>) {
        let entry = self.repos.entry(repo.clone()).or_insert_with(|| crate::domain::Repo { repo: repo.clone(), muted: false, collapsed: false });
        entry.collapsed = collapsed;
        if let Err(e) = self.persist_repo_state() {
            let _ = reply.send(Err(e));
            return;
        }
        self.broadcast(Event::ReposUpdated { repos: self.repos_snapshot() });
        let _ = reply.send(Ok(Event::Ack));
    }

    fn persist_repo_state(&self) -> Result<(), DaemonError> {
        let snapshot: std::collections::HashMap<String, crate::collab::RepoPersisted> = self
            .repos
            .iter()
            .map(|(k, v)| (k.clone(), crate::collab::RepoPersisted { muted: v.muted, collapsed: v.collapsed }))
            .collect();
        self.store.save_repo_state(&snapshot)
    }

    /// Replaces the PR map with a freshly polled snapshot, carrying forward
    /// the `muted` flag the poller itself has no way to know about.
    pub(super) fn apply_prs_refreshed(&mut self, mut prs: Vec<Pr>) {
        for pr in &mut prs {
            if let Some(prior) = self.prs.get(&pr.id) {
                pr.muted = prior.muted;
            }
        }
        self.prs = prs.into_iter().map(|pr| (pr.id.clone(), pr)).collect();
        self.sync_repos_and_authors();
        self.broadcast(Event::PrsUpdated { prs: self.prs_snapshot() });
    }

    pub(super) fn apply_pr_details_fetched(&mut self, id: String, head_sha: String, head_branch: String, ci_status: CiStatus) {
        let Some(pr) = self.prs.get_mut(&id) else { return };
        pr.head_sha = head_sha;
        pr.head_branch = head_branch;
        pr.ci_status = Some(ci_status);
        pr.details_fetched = true;
        pr.details_fetched_at = Some(crate::domain::epoch_ms() / 1000);
        self.broadcast(Event::PrsUpdated { prs: self.prs_snapshot() });
    }
}
