// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Review-state store. One JSON file per
//! review under `<data_root>/reviews/<review_id>.json`, written atomically
//! (write tmp + rename, same as `settingsstore`). The AI review generator
//! and the diff/comment GUI are out of scope; this module only tracks the
//! lifecycle and the comment thread a client attaches to a review.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::domain::epoch_ms;
use crate::error::DaemonError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub path: String,
    pub line: u64,
    pub body: String,
    pub resolved: bool,
    pub wont_fix: bool,
    pub created_at: u64,
    pub updated_at: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewState {
    pub review_id: String,
    pub pr_id: String,
    pub cancelled: bool,
    pub viewed_files: Vec<String>,
    pub comments: Vec<Comment>,
    pub created_at: u64,
}

impl ReviewState {
    fn new(review_id: String, pr_id: String, now: u64) -> Self {
        Self { review_id, pr_id, cancelled: false, viewed_files: Vec::new(), comments: Vec::new(), created_at: now }
    }
}

/// Keeps every review in memory and mirrors each one to disk on mutation.
pub struct ReviewStore {
    dir: PathBuf,
    reviews: Mutex<HashMap<String, ReviewState>>,
}

impl ReviewStore {
    /// Loads any reviews already persisted under `dir` (created if absent).
    pub fn load(dir: PathBuf) -> Result<Self, DaemonError> {
        std::fs::create_dir_all(&dir).map_err(|e| DaemonError::fatal(format!("creating review store dir: {e}")))?;
        let mut reviews = HashMap::new();
        let entries = std::fs::read_dir(&dir).map_err(|e| DaemonError::fatal(format!("reading review store dir: {e}")))?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Ok(contents) = std::fs::read_to_string(&path) else { continue };
            match serde_json::from_str::<ReviewState>(&contents) {
                Ok(state) => {
                    reviews.insert(state.review_id.clone(), state);
                }
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping malformed review file"),
            }
        }
        Ok(Self { dir, reviews: Mutex::new(reviews) })
    }

    fn path_for(&self, review_id: &str) -> PathBuf {
        self.dir.join(format!("{review_id}.json"))
    }

    fn persist(&self, state: &ReviewState) -> Result<(), DaemonError> {
        let json = serde_json::to_string_pretty(state).map_err(|e| DaemonError::fatal(format!("serializing review state: {e}")))?;
        let path = self.path_for(&state.review_id);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| DaemonError::permanent(format!("writing {}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, &path).map_err(|e| DaemonError::permanent(format!("renaming {}: {e}", tmp.display())))?;
        Ok(())
    }

    pub fn start_review(&self, pr_id: &str) -> Result<ReviewState, DaemonError> {
        let review_id = uuid::Uuid::new_v4().to_string();
        let state = ReviewState::new(review_id.clone(), pr_id.to_owned(), epoch_ms());
        self.persist(&state)?;
        self.reviews.lock().insert(review_id, state.clone());
        Ok(state)
    }

    pub fn cancel_review(&self, review_id: &str) -> Result<(), DaemonError> {
        self.with_review_mut(review_id, |state| {
            state.cancelled = true;
        })
    }

    pub fn get_review_state(&self, review_id: &str) -> Result<ReviewState, DaemonError> {
        self.reviews
            .lock()
            .get(review_id)
            .cloned()
            .ok_or_else(|| DaemonError::not_found(format!("unknown review {review_id}")))
    }

    pub fn mark_file_viewed(&self, review_id: &str, path: &str) -> Result<(), DaemonError> {
        self.with_review_mut(review_id, |state| {
            if !state.viewed_files.iter().any(|p| p == path) {
                state.viewed_files.push(path.to_owned());
            }
        })
    }

    pub fn add_comment(&self, review_id: &str, path: &str, line: u64, body: &str) -> Result<Comment, DaemonError> {
        let now = epoch_ms();
        let comment = Comment {
            id: uuid::Uuid::new_v4().to_string(),
            path: path.to_owned(),
            line,
            body: body.to_owned(),
            resolved: false,
            wont_fix: false,
            created_at: now,
            updated_at: now,
        };
        let inserted = comment.clone();
        self.with_review_mut(review_id, |state| state.comments.push(comment))?;
        Ok(inserted)
    }

    pub fn get_comments(&self, review_id: &str) -> Result<Vec<Comment>, DaemonError> {
        Ok(self.get_review_state(review_id)?.comments)
    }

    pub fn resolve_comment(&self, review_id: &str, comment_id: &str) -> Result<(), DaemonError> {
        self.with_comment_mut(review_id, comment_id, |c| c.resolved = true)
    }

    pub fn wont_fix_comment(&self, review_id: &str, comment_id: &str) -> Result<(), DaemonError> {
        self.with_comment_mut(review_id, comment_id, |c| c.wont_fix = true)
    }

    pub fn update_comment(&self, review_id: &str, comment_id: &str, body: &str) -> Result<(), DaemonError> {
        let body = body.to_owned();
        self.with_comment_mut(review_id, comment_id, move |c| c.body = body.clone())
    }

    pub fn delete_comment(&self, review_id: &str, comment_id: &str) -> Result<(), DaemonError> {
        self.with_review_mut(review_id, |state| {
            state.comments.retain(|c| c.id != comment_id);
        })
    }

    fn with_review_mut(&self, review_id: &str, f: impl FnOnce(&mut ReviewState)) -> Result<(), DaemonError> {
        let mut guard = self.reviews.lock();
        let state = guard.get_mut(review_id).ok_or_else(|| DaemonError::not_found(format!("unknown review {review_id}")))?;
        f(state);
        self.persist(state)
    }

    fn with_comment_mut(&self, review_id: &str, comment_id: &str, f: impl FnOnce(&mut Comment)) -> Result<(), DaemonError> {
        self.with_review_mut(review_id, |state| {
            if let Some(comment) = state.comments.iter_mut().find(|c| c.id == comment_id) {
                f(comment);
                comment.updated_at = epoch_ms();
            }
        })
    }
}

pub fn default_dir(data_root: &Path) -> PathBuf {
    data_root.join("reviews")
}
