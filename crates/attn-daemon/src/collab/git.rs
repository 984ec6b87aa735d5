// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Git/worktree helper. Every operation shells out to the `git`
//! binary in the target repo's directory; none of this module holds state
//! beyond the working trees it touches.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::process::Command;

use crate::domain::epoch_ms;
use crate::error::DaemonError;

const GIT_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Clone, serde::Serialize)]
pub struct Branch {
    pub name: String,
    pub current: bool,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RepoInfo {
    pub default_branch: String,
    pub current_branch: String,
    pub dirty: bool,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct StashPopResult {
    pub conflict: bool,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct AttnStashResult {
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stash_ref: Option<String>,
}

/// Stateless git helper. One instance is shared by the core for every repo.
#[derive(Default, Clone, Copy)]
pub struct GitOps;

impl GitOps {
    async fn run(&self, dir: &Path, args: &[&str]) -> Result<String, DaemonError> {
        let output = tokio::time::timeout(GIT_TIMEOUT, Command::new("git").args(args).current_dir(dir).output())
            .await
            .map_err(|_| DaemonError::transient(format!("git {args:?} timed out")))?
            .map_err(|e| DaemonError::permanent(format!("spawning git {args:?}: {e}")))?;

        if !output.status.success() {
            return Err(DaemonError::conflict(
                String::from_utf8_lossy(&output.stderr).trim().to_owned(),
                "git_failed",
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
    }

    pub async fn list_branches(&self, repo: &Path) -> Result<Vec<Branch>, DaemonError> {
        let current = self.run(repo, &["rev-parse", "--abbrev-ref", "HEAD"]).await.ok();
        let out = self.run(repo, &["branch", "--format=%(refname:short)"]).await?;
        Ok(out
            .lines()
            .filter(|l| !l.is_empty())
            .map(|name| Branch { current: Some(name) == current.as_deref(), name: name.to_owned() })
            .collect())
    }

    pub async fn list_remote_branches(&self, repo: &Path) -> Result<Vec<Branch>, DaemonError> {
        let out = self.run(repo, &["branch", "-r", "--format=%(refname:short)"]).await?;
        Ok(out.lines().filter(|l| !l.is_empty()).map(|name| Branch { name: name.to_owned(), current: false }).collect())
    }

    pub async fn list_worktrees(&self, repo: &Path) -> Result<Vec<String>, DaemonError> {
        let out = self.run(repo, &["worktree", "list", "--porcelain"]).await?;
        Ok(out
            .lines()
            .filter_map(|l| l.strip_prefix("worktree "))
            .map(str::to_owned)
            .collect())
    }

    pub async fn create_branch(&self, repo: &Path, name: &str) -> Result<(), DaemonError> {
        self.run(repo, &["branch", name]).await.map(|_| ())
    }

    pub async fn switch_branch(&self, repo: &Path, branch: &str) -> Result<(), DaemonError> {
        self.run(repo, &["switch", branch]).await.map(|_| ())
    }

    pub async fn delete_branch(&self, repo: &Path, name: &str) -> Result<(), DaemonError> {
        self.run(repo, &["branch", "-D", name]).await.map(|_| ())
    }

    /// Creates a worktree checked out at a freshly minted branch, one per
    /// session.
    pub async fn create_worktree(&self, repo: &Path, path: Option<&str>) -> Result<PathBuf, DaemonError> {
        let branch = format!("attn/{}", epoch_ms());
        self.create_worktree_from_branch(repo, &branch, path).await
    }

    pub async fn create_worktree_from_branch(
        &self,
        repo: &Path,
        branch: &str,
        path: Option<&str>,
    ) -> Result<PathBuf, DaemonError> {
        let target = match path {
            Some(p) => PathBuf::from(p),
            None => repo.join("..").join(sanitize_branch(branch)),
        };
        let exists = self.run(repo, &["rev-parse", "--verify", branch]).await.is_ok();
        let target_str = target.display().to_string();
        if exists {
            self.run(repo, &["worktree", "add", &target_str, branch]).await?;
        } else {
            self.run(repo, &["worktree", "add", "-b", branch, &target_str]).await?;
        }
        Ok(target)
    }

    pub async fn delete_worktree(&self, repo: &Path, path: &Path) -> Result<(), DaemonError> {
        let path_str = path.display().to_string();
        self.run(repo, &["worktree", "remove", "--force", &path_str]).await.map(|_| ())
    }

    pub async fn check_dirty(&self, repo: &Path) -> Result<bool, DaemonError> {
        let out = self.run(repo, &["status", "--porcelain"]).await?;
        Ok(!out.is_empty())
    }

    pub async fn stash(&self, repo: &Path, message: Option<&str>) -> Result<(), DaemonError> {
        let msg = message.map(str::to_owned).unwrap_or_else(|| "attn-wip".to_owned());
        self.run(repo, &["stash", "push", "-u", "-m", &msg]).await.map(|_| ())
    }

    pub async fn stash_pop(&self, repo: &Path) -> Result<StashPopResult, DaemonError> {
        match self.run(repo, &["stash", "pop"]).await {
            Ok(_) => Ok(StashPopResult { conflict: false }),
            Err(DaemonError::Conflict { .. }) => Ok(StashPopResult { conflict: true }),
            Err(e) => Err(e),
        }
    }

    /// Looks for a stash entry whose message references `branch`, the
    /// convention `commit_wip`/`stash` leave behind.
    pub async fn check_attn_stash(&self, repo: &Path, branch: &str) -> Result<AttnStashResult, DaemonError> {
        let out = self.run(repo, &["stash", "list"]).await.unwrap_or_default();
        for (idx, line) in out.lines().enumerate() {
            if line.contains(branch) {
                return Ok(AttnStashResult { found: true, stash_ref: Some(format!("stash@{{{idx}}}")) });
            }
        }
        Ok(AttnStashResult { found: false, stash_ref: None })
    }

    pub async fn commit_wip(&self, repo: &Path) -> Result<(), DaemonError> {
        self.run(repo, &["add", "-A"]).await?;
        self.run(repo, &["commit", "-m", "attn: wip checkpoint", "--no-verify"]).await.map(|_| ())
    }

    pub async fn fetch_remotes(&self, repo: &Path) -> Result<(), DaemonError> {
        self.run(repo, &["fetch", "--all", "--prune"]).await.map(|_| ())
    }

    pub async fn get_default_branch(&self, repo: &Path) -> Result<String, DaemonError> {
        if let Ok(out) = self.run(repo, &["symbolic-ref", "refs/remotes/origin/HEAD"]).await {
            if let Some(name) = out.rsplit('/').next() {
                return Ok(name.to_owned());
            }
        }
        for candidate in ["main", "master"] {
            if self.run(repo, &["rev-parse", "--verify", candidate]).await.is_ok() {
                return Ok(candidate.to_owned());
            }
        }
        Err(DaemonError::not_found("no default branch found"))
    }

    pub async fn get_repo_info(&self, repo: &Path) -> Result<RepoInfo, DaemonError> {
        let current_branch = self.run(repo, &["rev-parse", "--abbrev-ref", "HEAD"]).await?;
        let default_branch = self.get_default_branch(repo).await.unwrap_or_else(|_| current_branch.clone());
        let dirty = self.check_dirty(repo).await?;
        Ok(RepoInfo { default_branch, current_branch, dirty })
    }

    pub async fn get_file_diff(&self, repo: &Path, path: &str, base: Option<&str>) -> Result<String, DaemonError> {
        let base = base.unwrap_or("HEAD");
        self.run(repo, &["diff", base, "--", path]).await
    }

    pub async fn get_branch_diff_files(&self, repo: &Path, branch: &str) -> Result<Vec<String>, DaemonError> {
        let merge_base = self.run(repo, &["merge-base", "HEAD", branch]).await?;
        let out = self.run(repo, &["diff", "--name-only", &merge_base, branch]).await?;
        Ok(out.lines().filter(|l| !l.is_empty()).map(str::to_owned).collect())
    }

    /// Clones `clone_url` into `target_path` if it doesn't already contain a
    /// `.git` directory; otherwise a no-op.
    pub async fn ensure_repo(&self, target_path: &Path, clone_url: &str) -> Result<bool, DaemonError> {
        if target_path.join(".git").exists() {
            return Ok(false);
        }
        if let Some(parent) = target_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| DaemonError::permanent(format!("creating {}: {e}", parent.display())))?;
        }
        let target_str = target_path.display().to_string();
        let output = tokio::time::timeout(
            Duration::from_secs(120),
            Command::new("git").args(["clone", clone_url, &target_str]).output(),
        )
        .await
        .map_err(|_| DaemonError::transient("git clone timed out"))?
        .map_err(|e| DaemonError::permanent(format!("spawning git clone: {e}")))?;
        if !output.status.success() {
            return Err(DaemonError::permanent(String::from_utf8_lossy(&output.stderr).trim().to_owned()));
        }
        Ok(true)
    }
}

fn sanitize_branch(branch: &str) -> String {
    branch.chars().map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' }).collect()
}
