// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The attention core: the single writer for every domain entity
//! (sessions, PRs, repos, authors, warnings, settings). One task owns this
//! struct outright; nothing outside `core/` ever mutates these maps. Client
//! commands and background events both funnel through [`Core::run`] as a
//! single `tokio::select!` loop, so every mutation+broadcast pair is
//! effectively atomic from an observer's point of view.
//!
//! Command handlers that would block the loop for more than a local IPC
//! round-trip (git shell-outs, code-host HTTP calls) are offloaded: the
//! handler `tokio::spawn`s the work, moves the reply channel into the
//! spawned task so the client gets its answer without waiting on the loop,
//! and — if the operation has a state change worth telling every client
//! about — sends a [`CoreEvent`] back through `core_tx` that the next
//! `select!` iteration folds into the maps and broadcasts.

mod git;
mod prs;
mod review;
mod sessions;
mod settings;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use indexmap::IndexMap;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::collab::{GitOps, ReviewStore, SettingsStore};
use crate::config::DaemonConfig;
use crate::domain::{Author, Pr, Repo, Session, Settings, Warning};
use crate::error::DaemonError;
use crate::hostclient::ClientRegistry;
use crate::poller::Poller;
use crate::protocol::{Command, CommandEnvelope, CoreEvent, Event};
use crate::supervisor::Supervisor;

/// Everything the attention core needs besides the maps it owns itself.
pub struct CoreDeps {
    pub daemon_instance_id: String,
    pub data_root: PathBuf,
    pub supervisor: Arc<Supervisor>,
    pub hostclients: Arc<ClientRegistry>,
    pub poller: Arc<Poller>,
    pub settings_tx: watch::Sender<Settings>,
    pub broadcast_tx: broadcast::Sender<Event>,
    pub core_tx: mpsc::UnboundedSender<CoreEvent>,
}

pub struct Core {
    sessions: IndexMap<String, Session>,
    prs: IndexMap<String, Pr>,
    repos: IndexMap<String, Repo>,
    authors: IndexMap<String, Author>,
    warnings: Vec<Warning>,
    settings: Settings,
    settings_tx: watch::Sender<Settings>,

    daemon_instance_id: String,
    data_root: PathBuf,
    supervisor: Arc<Supervisor>,
    hostclients: Arc<ClientRegistry>,
    poller: Arc<Poller>,
    git: GitOps,
    reviews: ReviewStore,
    store: SettingsStore,

    broadcast_tx: broadcast::Sender<Event>,
    core_tx: mpsc::UnboundedSender<CoreEvent>,
    git_status_subs: HashMap<String, CancellationToken>,
}

impl Core {
    /// Builds the core, loading persisted settings/mute-state/reviews from
    /// `deps.data_root`. Never touches the
    /// network or spawns a worker; those only happen once `run` starts
    /// consuming commands.
    pub fn new(deps: CoreDeps) -> Result<Self, DaemonError> {
        let store = SettingsStore::new(&deps.data_root);
        let settings = store.load_settings();
        let _ = deps.settings_tx.send(settings.clone());

        let repo_state = store.load_repo_state();
        let mut repos = IndexMap::new();
        for (repo, persisted) in repo_state {
            repos.insert(repo.clone(), Repo { repo, muted: persisted.muted, collapsed: persisted.collapsed });
        }

        let author_state = store.load_authors();
        let mut authors = IndexMap::new();
        for (author, muted) in author_state {
            authors.insert(author.clone(), Author { author, muted });
        }

        let reviews = ReviewStore::load(crate::collab::reviewstore::default_dir(&deps.data_root))?;

        Ok(Self {
            sessions: IndexMap::new(),
            prs: IndexMap::new(),
            repos,
            authors,
            warnings: Vec::new(),
            settings,
            settings_tx: deps.settings_tx,
            daemon_instance_id: deps.daemon_instance_id,
            data_root: deps.data_root,
            supervisor: deps.supervisor,
            hostclients: deps.hostclients,
            poller: deps.poller,
            git: GitOps,
            reviews,
            store,
            broadcast_tx: deps.broadcast_tx,
            core_tx: deps.core_tx,
            git_status_subs: HashMap::new(),
        })
    }

    /// Runs until `shutdown` is cancelled or both channels close. Never
    /// panics on a full/dead broadcast channel: clients come and go, and a
    /// `send` with zero receivers is simply lossy by design.
    pub async fn run(
        mut self,
        mut cmd_rx: mpsc::UnboundedReceiver<CommandEnvelope>,
        mut event_rx: mpsc::UnboundedReceiver<CoreEvent>,
        shutdown: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("attention core shutting down");
                    return;
                }
                envelope = cmd_rx.recv() => {
                    match envelope {
                        Some(CommandEnvelope { command, reply }) => self.dispatch(command, reply).await,
                        None => return,
                    }
                }
                event = event_rx.recv() => {
                    match event {
                        Some(event) => self.apply_event(event).await,
                        None => return,
                    }
                }
            }
        }
    }

    fn broadcast(&self, event: Event) {
        let _ = self.broadcast_tx.send(event);
    }

    fn sessions_snapshot(&self) -> Vec<Session> {
        self.sessions.values().cloned().collect()
    }

    fn prs_snapshot(&self) -> Vec<Pr> {
        self.prs.values().cloned().collect()
    }

    fn repos_snapshot(&self) -> Vec<Repo> {
        self.repos.values().cloned().collect()
    }

    fn authors_snapshot(&self) -> Vec<Author> {
        self.authors.values().cloned().collect()
    }

    fn push_warning(&mut self, code: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(Warning { code: code.into(), message: message.into(), at: crate::domain::epoch_ms() / 1000 });
        let warnings = self.warnings.clone();
        self.broadcast(Event::WarningsUpdated { warnings });
    }

    /// Ensures a `Repo`/`Author` entry exists for every repo/author any
    /// session or PR currently references, and drops entries nothing
    /// references any more.
    fn sync_repos_and_authors(&mut self) {
        let mut referenced_repos: std::collections::HashSet<String> = std::collections::HashSet::new();
        let mut referenced_authors: std::collections::HashSet<String> = std::collections::HashSet::new();
        for pr in self.prs.values() {
            referenced_repos.insert(pr.repo.clone());
            referenced_authors.insert(pr.author.clone());
        }
        for session in self.sessions.values() {
            if let Some(repo) = &session.main_repo {
                referenced_repos.insert(repo.clone());
            }
        }

        for repo in &referenced_repos {
            self.repos.entry(repo.clone()).or_insert_with(|| Repo { repo: repo.clone(), muted: false, collapsed: false });
        }
        self.repos.retain(|repo, _| referenced_repos.contains(repo));

        for author in &referenced_authors {
            self.authors.entry(author.clone()).or_insert_with(|| Author { author: author.clone(), muted: false });
        }
        self.authors.retain(|author, _| referenced_authors.contains(author));
    }

    async fn dispatch(&mut self, command: Command, reply: oneshot::Sender<Result<Event, DaemonError>>) {
        match command {
            // -- Session lifecycle ----------------------------------------
            Command::SpawnSession { id, agent, cwd, cols, rows, label, resume_session_id, fork_session, executable_override } => {
                self.cmd_spawn_session(id, agent, cwd, cols, rows, label, resume_session_id, fork_session, executable_override, reply).await
            }
            Command::AttachSession { id, from_seq } => self.cmd_attach_session(id, from_seq, reply).await,
            Command::DetachSession { .. } => {
                let _ = reply.send(Ok(Event::Ack));
            }
            Command::KillSession { id, signal } => self.cmd_kill_session(id, signal, reply).await,
            Command::Register { id, agent, cwd } => self.cmd_register(id, agent, cwd, reply).await,
            Command::Unregister { id } => self.cmd_unregister(id, reply).await,
            Command::Heartbeat { .. } => {
                let _ = reply.send(Ok(Event::Ack));
            }
            Command::State { id, state } => self.cmd_state(id, state, reply).await,
            Command::Todos { id, todos } => self.cmd_todos(id, todos, reply).await,
            Command::Stop { id } => self.cmd_stop(id, reply).await,
            Command::Mute { id, muted } => self.cmd_mute_session(id, muted, reply).await,
            Command::ClearSessions => self.cmd_clear_sessions(reply).await,
            Command::SessionVisualized { id } => self.cmd_session_visualized(id, reply).await,
            Command::PtyInput { id, data } => self.cmd_pty_input(id, data, reply).await,
            Command::PtyResize { id, cols, rows } => self.cmd_pty_resize(id, cols, rows, reply).await,

            // -- PRs / repos / authors -------------------------------------
            Command::Query => {
                let _ = reply.send(Ok(Event::QueryResult {
                    sessions: self.sessions_snapshot(),
                    prs: self.prs_snapshot(),
                    repos: self.repos_snapshot(),
                    authors: self.authors_snapshot(),
                }));
            }
            Command::QueryPrs => {
                let _ = reply.send(Ok(Event::PrsUpdated { prs: self.prs_snapshot() }));
            }
            Command::QueryRepos => {
                let _ = reply.send(Ok(Event::ReposUpdated { repos: self.repos_snapshot() }));
            }
            Command::QueryAuthors => {
                let _ = reply.send(Ok(Event::AuthorsUpdated { authors: self.authors_snapshot() }));
            }
            Command::RefreshPrs => self.cmd_refresh_prs(reply).await,
            Command::FetchPrDetails { id } => self.cmd_fetch_pr_details(id, reply).await,
            Command::ApprovePr { id } => self.cmd_approve_pr(id, reply).await,
            Command::MergePr { id } => self.cmd_merge_pr(id, reply).await,
            Command::PrVisited { id } => self.cmd_pr_visited(id, reply).await,
            Command::MutePr { id, muted } => self.cmd_mute_pr(id, muted, reply).await,
            Command::MuteRepo { repo, muted } => self.cmd_mute_repo(repo, muted, reply).await,
            Command::MuteAuthor { author, muted } => self.cmd_mute_author(author, muted, reply).await,
            Command::CollapseRepo { repo, collapsed } => self.cmd_collapse_repo(repo, collapsed, reply).await,

            // -- Git / worktrees --------------------------------------------
            Command::GetRepoInfo { repo } => self.cmd_get_repo_info(repo, reply).await,
            Command::ListBranches { repo } => self.cmd_list_branches(repo, reply).await,
            Command::ListRemoteBranches { repo } => self.cmd_list_remote_branches(repo, reply).await,
            Command::ListWorktrees { repo } => self.cmd_list_worktrees(repo, reply).await,
            Command::CreateBranch { repo, name } => self.cmd_create_branch(repo, name, reply).await,
            Command::SwitchBranch { repo, branch } => self.cmd_switch_branch(repo, branch, reply).await,
            Command::DeleteBranch { repo, branch } => self.cmd_delete_branch(repo, branch, reply).await,
            Command::CreateWorktree { repo, path } => self.cmd_create_worktree(repo, path, reply).await,
            Command::CreateWorktreeFromBranch { repo, branch, path } => {
                self.cmd_create_worktree_from_branch(repo, branch, path, reply).await
            }
            Command::DeleteWorktree { path } => self.cmd_delete_worktree(path, reply).await,
            Command::CheckDirty { repo } => self.cmd_check_dirty(repo, reply).await,
            Command::CheckAttnStash { repo, branch } => self.cmd_check_attn_stash(repo, branch, reply).await,
            Command::Stash { repo, message } => self.cmd_stash(repo, message, reply).await,
            Command::StashPop { repo } => self.cmd_stash_pop(repo, reply).await,
            Command::CommitWip { repo } => self.cmd_commit_wip(repo, reply).await,
            Command::FetchRemotes { repo } => self.cmd_fetch_remotes(repo, reply).await,
            Command::GetDefaultBranch { repo } => self.cmd_get_default_branch(repo, reply).await,
            Command::SubscribeGitStatus { dir } => self.cmd_subscribe_git_status(dir, reply).await,
            Command::UnsubscribeGitStatus { dir } => self.cmd_unsubscribe_git_status(dir, reply).await,
            Command::GetFileDiff { repo, path, base } => self.cmd_get_file_diff(repo, path, base, reply).await,
            Command::GetBranchDiffFiles { repo, branch } => self.cmd_get_branch_diff_files(repo, branch, reply).await,
            Command::EnsureRepo { target_path, clone_url } => self.cmd_ensure_repo(target_path, clone_url, reply).await,
            Command::GetRecentLocations => {
                let _ = reply.send(Ok(Event::RecentLocationsResult { locations: self.store.load_recent_locations() }));
            }

            // -- Review -----------------------------------------------------
            Command::StartReview { pr_id } => self.cmd_start_review(pr_id, reply),
            Command::CancelReview { review_id } => self.cmd_cancel_review(review_id, reply),
            Command::GetReviewState { review_id } => self.cmd_get_review_state(review_id, reply),
            Command::MarkFileViewed { review_id, path } => self.cmd_mark_file_viewed(review_id, path, reply),
            Command::AddComment { review_id, path, line, body } => self.cmd_add_comment(review_id, path, line, body, reply),
            Command::GetComments { review_id } => self.cmd_get_comments(review_id, reply),
            Command::ResolveComment { review_id, comment_id } => self.cmd_resolve_comment(review_id, comment_id, reply),
            Command::WontFixComment { review_id, comment_id } => self.cmd_wont_fix_comment(review_id, comment_id, reply),
            Command::UpdateComment { review_id, comment_id, body } => self.cmd_update_comment(review_id, comment_id, body, reply),
            Command::DeleteComment { review_id, comment_id } => self.cmd_delete_comment(review_id, comment_id, reply),

            // -- Settings / ops -----------------------------------------------
            Command::GetSettings => {
                let _ = reply.send(Ok(Event::SettingsResult { settings: self.settings.clone() }));
            }
            Command::SetSetting { key, value } => self.cmd_set_setting(key, value, reply),
            Command::ClearWarnings => {
                self.warnings.clear();
                self.broadcast(Event::WarningsUpdated { warnings: Vec::new() });
                let _ = reply.send(Ok(Event::Ack));
            }
            Command::InjectTestPr { pr } => self.cmd_inject_test_pr(pr, reply),
            Command::InjectTestSession { session } => self.cmd_inject_test_session(session, reply),
            Command::Snapshot => {
                let _ = reply.send(Ok(Event::InitialState {
                    sessions: self.sessions_snapshot(),
                    prs: self.prs_snapshot(),
                    repos: self.repos_snapshot(),
                    authors: self.authors_snapshot(),
                    settings: self.settings.clone(),
                    warnings: self.warnings.clone(),
                    daemon_instance_id: self.daemon_instance_id.clone(),
                    protocol_version: crate::protocol::PROTOCOL_VERSION,
                }));
            }
        }
    }

    async fn apply_event(&mut self, event: CoreEvent) {
        match event {
            CoreEvent::WorkerOutput { id, seq, data } => {
                if let Some(session) = self.sessions.get_mut(&id) {
                    session.last_seen = crate::domain::epoch_ms() / 1000;
                }
                self.broadcast(Event::PtyOutput { id, seq, data });
            }
            CoreEvent::WorkerState { .. } | CoreEvent::WorkerExited { .. } | CoreEvent::WorkerUnreachable { .. } | CoreEvent::SessionEvicted { .. } | CoreEvent::SessionRecovered { .. } | CoreEvent::SessionSpawned { .. } => {
                self.apply_session_event(event).await;
            }
            CoreEvent::PrsRefreshed { prs } => self.apply_prs_refreshed(prs),
            CoreEvent::RateLimited { host, resource, reset_at } => {
                self.broadcast(Event::RateLimited { host, resource, reset_at });
            }
            CoreEvent::PollWarning { code, message } => self.push_warning(code, message),
            CoreEvent::PrDetailsFetched { id, head_sha, head_branch, ci_status } => {
                self.apply_pr_details_fetched(id, head_sha, head_branch, ci_status);
            }
            CoreEvent::GitOpBroadcast(op) => self.apply_git_op_broadcast(op),
            CoreEvent::GitStatusTick { dir, dirty } => {
                self.broadcast(Event::GitStatusUpdate { dir, dirty });
            }
        }
    }
}
