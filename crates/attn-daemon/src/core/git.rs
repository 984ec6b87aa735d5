// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Git/worktree command handlers. Every one of these
//! shells out to `git`, so every one of these is offloaded to a spawned
//! task: the reply goes straight back to the caller from that task, and any
//! broadcast-worthy side effect (a branch switch, a worktree created or
//! removed) comes back through `core_tx` as a [`CoreEvent::GitOpBroadcast`].
//!
//! A `repo`/`dir` argument is always a local filesystem path, the same way
//! `Session.directory`/`main_repo` are paths rather than `owner/repo` host
//! slugs — the daemon never talks to a code host about a working tree, only
//! to `git` itself.

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use super::Core;
use crate::error::DaemonError;
use crate::protocol::{CoreEvent, Event, GitOpBroadcast};

/// Poll cadence for an active `subscribe_git_status` watcher.
const GIT_STATUS_POLL: Duration = Duration::from_secs(3);

impl Core {
    pub(super) async fn cmd_get_repo_info(&mut self, repo: String, reply: oneshot::Sender<Result<Event, DaemonError>>) {
        let git = self.git;
        tokio::spawn(async move {
            let result = git.get_repo_info(&PathBuf::from(&repo)).await;
            let _ = reply.send(result.map(|info| Event::RepoInfoResult { repo, info }));
        });
    }

    pub(super) async fn cmd_list_branches(&mut self, repo: String, reply: oneshot::Sender<Result<Event, DaemonError>>) {
        let git = self.git;
        tokio::spawn(async move {
            let result = git.list_branches(&PathBuf::from(&repo)).await;
            let _ = reply.send(result.map(|branches| Event::BranchesResult { repo, branches }));
        });
    }

    pub(super) async fn cmd_list_remote_branches(&mut self, repo: String, reply: oneshot::Sender<Result<Event, DaemonError>>) {
        let git = self.git;
        tokio::spawn(async move {
            let result = git.list_remote_branches(&PathBuf::from(&repo)).await;
            let _ = reply.send(result.map(|branches| Event::BranchesResult { repo, branches }));
        });
    }

    pub(super) async fn cmd_list_worktrees(&mut self, repo: String, reply: oneshot::Sender<Result<Event, DaemonError>>) {
        let git = self.git;
        tokio::spawn(async move {
            let result = git.list_worktrees(&PathBuf::from(&repo)).await;
            let _ = reply.send(result.map(|worktrees| Event::WorktreesResult { repo, worktrees }));
        });
    }

    pub(super) async fn cmd_create_branch(&mut self, repo: String, name: String, reply: oneshot::Sender<Result<Event, DaemonError>>) {
        let git = self.git;
        tokio::spawn(async move {
            let result = git.create_branch(&PathBuf::from(&repo), &name).await;
            let _ = reply.send(result.map(|_| Event::Ack));
        });
    }

    pub(super) async fn cmd_switch_branch(&mut self, repo: String, branch: String, reply: oneshot::Sender<Result<Event, DaemonError>>) {
        let git = self.git;
        let core_tx = self.core_tx.clone();
        tokio::spawn(async move {
            match git.switch_branch(&PathBuf::from(&repo), &branch).await {
                Ok(()) => {
                    let _ = reply.send(Ok(Event::Ack));
                    let _ = core_tx.send(CoreEvent::GitOpBroadcast(GitOpBroadcast::BranchChanged { repo, branch }));
                }
                Err(e) => {
                    let _ = reply.send(Err(e));
                }
            }
        });
    }

    pub(super) async fn cmd_delete_branch(&mut self, repo: String, branch: String, reply: oneshot::Sender<Result<Event, DaemonError>>) {
        let git = self.git;
        tokio::spawn(async move {
            let result = git.delete_branch(&PathBuf::from(&repo), &branch).await;
            let _ = reply.send(result.map(|_| Event::Ack));
        });
    }

    pub(super) async fn cmd_create_worktree(&mut self, repo: String, path: Option<String>, reply: oneshot::Sender<Result<Event, DaemonError>>) {
        let git = self.git;
        let core_tx = self.core_tx.clone();
        tokio::spawn(async move {
            let repo_path = PathBuf::from(&repo);
            match git.create_worktree(&repo_path, path.as_deref()).await {
                Ok(created) => finish_worktree_created(git, &repo_path, repo, created, reply, core_tx).await,
                Err(e) => {
                    let _ = reply.send(Err(e));
                }
            }
        });
    }

    pub(super) async fn cmd_create_worktree_from_branch(
        &mut self,
        repo: String,
        branch: String,
        path: Option<String>,
        reply: oneshot::Sender<Result<Event, DaemonError>>,
    ) {
        let git = self.git;
        let core_tx = self.core_tx.clone();
        tokio::spawn(async move {
            let repo_path = PathBuf::from(&repo);
            match git.create_worktree_from_branch(&repo_path, &branch, path.as_deref()).await {
                Ok(created) => finish_worktree_created(git, &repo_path, repo, created, reply, core_tx).await,
                Err(e) => {
                    let _ = reply.send(Err(e));
                }
            }
        });
    }

    pub(super) async fn cmd_delete_worktree(&mut self, path: String, reply: oneshot::Sender<Result<Event, DaemonError>>) {
        let git = self.git;
        let core_tx = self.core_tx.clone();
        let repo_for_listing = self.repo_owning_worktree(&path);
        tokio::spawn(async move {
            let worktree_path = PathBuf::from(&path);
            let repo_path = repo_for_listing.clone().unwrap_or_else(|| worktree_path.clone());
            match git.delete_worktree(&repo_path, &worktree_path).await {
                Ok(()) => {
                    let worktrees = git.list_worktrees(&repo_path).await.unwrap_or_default();
                    let _ = reply.send(Ok(Event::WorktreeDeleted { repo: repo_for_listing.map(|p| p.display().to_string()).unwrap_or_default(), path: path.clone() }));
                    let _ = core_tx.send(CoreEvent::GitOpBroadcast(GitOpBroadcast::WorktreeDeleted {
                        repo: repo_path.display().to_string(),
                        path,
                        worktrees,
                    }));
                }
                Err(e) => {
                    let _ = reply.send(Err(e));
                }
            }
        });
    }

    pub(super) async fn cmd_check_dirty(&mut self, repo: String, reply: oneshot::Sender<Result<Event, DaemonError>>) {
        let git = self.git;
        tokio::spawn(async move {
            let result = git.check_dirty(&PathBuf::from(&repo)).await;
            let _ = reply.send(result.map(|dirty| Event::DirtyResult { repo, dirty }));
        });
    }

    pub(super) async fn cmd_check_attn_stash(&mut self, repo: String, branch: String, reply: oneshot::Sender<Result<Event, DaemonError>>) {
        let git = self.git;
        tokio::spawn(async move {
            let result = git.check_attn_stash(&PathBuf::from(&repo), &branch).await;
            let _ = reply.send(result.map(|found| Event::AttnStashResult { repo, branch, found: found.found, stash_ref: found.stash_ref }));
        });
    }

    pub(super) async fn cmd_stash(&mut self, repo: String, message: Option<String>, reply: oneshot::Sender<Result<Event, DaemonError>>) {
        let git = self.git;
        tokio::spawn(async move {
            let result = git.stash(&PathBuf::from(&repo), message.as_deref()).await;
            let _ = reply.send(result.map(|_| Event::Ack));
        });
    }

    pub(super) async fn cmd_stash_pop(&mut self, repo: String, reply: oneshot::Sender<Result<Event, DaemonError>>) {
        let git = self.git;
        tokio::spawn(async move {
            let result = git.stash_pop(&PathBuf::from(&repo)).await;
            let _ = reply.send(result.map(|popped| Event::StashPopResult { repo, conflict: popped.conflict }));
        });
    }

    pub(super) async fn cmd_commit_wip(&mut self, repo: String, reply: oneshot::Sender<Result<Event, DaemonError>>) {
        let git = self.git;
        tokio::spawn(async move {
            let result = git.commit_wip(&PathBuf::from(&repo)).await;
            let _ = reply.send(result.map(|_| Event::Ack));
        });
    }

    pub(super) async fn cmd_fetch_remotes(&mut self, repo: String, reply: oneshot::Sender<Result<Event, DaemonError>>) {
        let git = self.git;
        tokio::spawn(async move {
            let result = git.fetch_remotes(&PathBuf::from(&repo)).await;
            let _ = reply.send(result.map(|_| Event::Ack));
        });
    }

    pub(super) async fn cmd_get_default_branch(&mut self, repo: String, reply: oneshot::Sender<Result<Event, DaemonError>>) {
        let git = self.git;
        tokio::spawn(async move {
            let result = git.get_default_branch(&PathBuf::from(&repo)).await;
            let _ = reply.send(result.map(|branch| Event::DefaultBranchResult { repo, branch }));
        });
    }

    pub(super) async fn cmd_get_file_diff(&mut self, repo: String, path: String, base: Option<String>, reply: oneshot::Sender<Result<Event, DaemonError>>) {
        let git = self.git;
        tokio::spawn(async move {
            let result = git.get_file_diff(&PathBuf::from(&repo), &path, base.as_deref()).await;
            let _ = reply.send(result.map(|diff| Event::FileDiffResult { repo, path, diff }));
        });
    }

    pub(super) async fn cmd_get_branch_diff_files(&mut self, repo: String, branch: String, reply: oneshot::Sender<Result<Event, DaemonError>>) {
        let git = self.git;
        tokio::spawn(async move {
            let result = git.get_branch_diff_files(&PathBuf::from(&repo), &branch).await;
            let _ = reply.send(result.map(|files| Event::BranchDiffFilesResult { repo, branch, files }));
        });
    }

    pub(super) async fn cmd_ensure_repo(&mut self, target_path: String, clone_url: String, reply: oneshot::Sender<Result<Event, DaemonError>>) {
        let git = self.git;
        tokio::spawn(async move {
            let result = git.ensure_repo(&PathBuf::from(&target_path), &clone_url).await;
            let _ = reply.send(result.map(|cloned| Event::EnsureRepoResult { target_path, cloned }));
        });
    }

    pub(super) async fn cmd_subscribe_git_status(&mut self, dir: String, reply: oneshot::Sender<Result<Event, DaemonError>>) {
        if self.git_status_subs.contains_key(&dir) {
            let _ = reply.send(Ok(Event::Ack));
            return;
        }
        let stop = CancellationToken::new();
        self.git_status_subs.insert(dir.clone(), stop.clone());
        let git = self.git;
        let core_tx = self.core_tx.clone();
        tokio::spawn(async move {
            let path = PathBuf::from(&dir);
            loop {
                tokio::select! {
                    _ = stop.cancelled() => return,
                    _ = tokio::time::sleep(GIT_STATUS_POLL) => {}
                }
                if let Ok(dirty) = git.check_dirty(&path).await {
                    let _ = core_tx.send(CoreEvent::GitStatusTick { dir: dir.clone(), dirty });
                }
            }
        });
        let _ = reply.send(Ok(Event::Ack));
    }

    pub(super) async fn cmd_unsubscribe_git_status(&mut self, dir: String, reply: oneshot::Sender<Result<Event, DaemonError>>) {
        if let Some(stop) = self.git_status_subs.remove(&dir) {
            stop.cancel();
        }
        let _ = reply.send(Ok(Event::Ack));
    }

    pub(super) fn apply_git_op_broadcast(&mut self, op: GitOpBroadcast) {
        match op {
            GitOpBroadcast::BranchChanged { repo, branch } => {
                self.broadcast(Event::BranchChanged { repo, branch });
            }
            GitOpBroadcast::WorktreeCreated { repo, path, worktrees } => {
                self.broadcast(Event::WorktreeCreated { repo: repo.clone(), path });
                self.broadcast(Event::WorktreesUpdated { repo, worktrees });
            }
            GitOpBroadcast::WorktreeDeleted { repo, path, worktrees } => {
                self.broadcast(Event::WorktreeDeleted { repo: repo.clone(), path });
                self.broadcast(Event::WorktreesUpdated { repo, worktrees });
            }
        }
    }

    /// Best-effort: finds which session's `main_repo` a worktree path was
    /// created under, so `delete_worktree` (which only receives the
    /// worktree's own path) can still run `git worktree remove` from the
    /// owning repo's directory. Falls back to the worktree path itself (a
    /// worktree's `.git` file points back at the owning repo regardless of
    /// which directory `git worktree remove` is invoked from).
    fn repo_owning_worktree(&self, path: &str) -> Option<PathBuf> {
        self.sessions
            .values()
            .find(|s| s.directory == path)
            .and_then(|s| s.main_repo.as_deref())
            .map(PathBuf::from)
            .or_else(|| Some(PathBuf::from(path)))
    }
}

async fn finish_worktree_created(
    git: crate::collab::GitOps,
    repo_path: &std::path::Path,
    repo: String,
    created: PathBuf,
    reply: oneshot::Sender<Result<Event, DaemonError>>,
    core_tx: tokio::sync::mpsc::UnboundedSender<CoreEvent>,
) {
    let path = created.display().to_string();
    let worktrees = git.list_worktrees(repo_path).await.unwrap_or_default();
    let _ = reply.send(Ok(Event::WorktreeCreated { repo: repo.clone(), path: path.clone() }));
    let _ = core_tx.send(CoreEvent::GitOpBroadcast(GitOpBroadcast::WorktreeCreated { repo, path, worktrees }));
}
