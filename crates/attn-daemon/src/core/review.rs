// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Review command handlers. The AI review generator itself is an external collaborator
//!; these handlers only manage the lifecycle and
//! comment thread a client attaches to a review. All of it is synchronous,
//! in-process disk I/O (`ReviewStore`), so nothing here is offloaded.

use tokio::sync::oneshot;

use super::Core;
use crate::error::DaemonError;
use crate::protocol::Event;

impl Core {
    pub(super) fn cmd_start_review(&mut self, pr_id: String, reply: oneshot::Sender<Result<Event, DaemonError>>) {
        if !self.prs.contains_key(&pr_id) {
            let _ = reply.send(Err(DaemonError::not_found(format!("unknown pr {pr_id}"))));
            return;
        }
        let result = self.reviews.start_review(&pr_id).map(|state| {
            self.broadcast(Event::ReviewStarted { review_id: state.review_id.clone(), pr_id: state.pr_id.clone() });
            Event::ReviewStarted { review_id: state.review_id, pr_id: state.pr_id }
        });
        let _ = reply.send(result);
    }

    pub(super) fn cmd_cancel_review(&mut self, review_id: String, reply: oneshot::Sender<Result<Event, DaemonError>>) {
        let result = self.reviews.cancel_review(&review_id).map(|_| {
            self.broadcast(Event::ReviewCancelled { review_id: review_id.clone() });
            Event::ReviewCancelled { review_id }
        });
        let _ = reply.send(result);
    }

    pub(super) fn cmd_get_review_state(&mut self, review_id: String, reply: oneshot::Sender<Result<Event, DaemonError>>) {
        let result = self.reviews.get_review_state(&review_id).map(|state| Event::ReviewStateResult {
            review_id: state.review_id,
            pr_id: state.pr_id,
            cancelled: state.cancelled,
            viewed_files: state.viewed_files,
            comments: state.comments,
        });
        let _ = reply.send(result);
    }

    pub(super) fn cmd_mark_file_viewed(&mut self, review_id: String, path: String, reply: oneshot::Sender<Result<Event, DaemonError>>) {
        let result = self.reviews.mark_file_viewed(&review_id, &path).map(|_| Event::Ack);
        let _ = reply.send(result);
    }

    pub(super) fn cmd_add_comment(
        &mut self,
        review_id: String,
        path: String,
        line: u64,
        body: String,
        reply: oneshot::Sender<Result<Event, DaemonError>>,
    ) {
        let result = self.reviews.add_comment(&review_id, &path, line, &body).map(|comment| {
            self.broadcast(Event::CommentsResult { review_id: review_id.clone(), comments: vec![comment.clone()] });
            Event::CommentResult { review_id, comment }
        });
        let _ = reply.send(result);
    }

    pub(super) fn cmd_get_comments(&mut self, review_id: String, reply: oneshot::Sender<Result<Event, DaemonError>>) {
        let result = self.reviews.get_comments(&review_id).map(|comments| Event::CommentsResult { review_id, comments });
        let _ = reply.send(result);
    }

    pub(super) fn cmd_resolve_comment(&mut self, review_id: String, comment_id: String, reply: oneshot::Sender<Result<Event, DaemonError>>) {
        let result = self.reviews.resolve_comment(&review_id, &comment_id).map(|_| {
            self.broadcast(Event::ReviewCommentResolved { review_id: review_id.clone(), comment_id: comment_id.clone() });
            Event::ReviewCommentResolved { review_id, comment_id }
        });
        let _ = reply.send(result);
    }

    pub(super) fn cmd_wont_fix_comment(&mut self, review_id: String, comment_id: String, reply: oneshot::Sender<Result<Event, DaemonError>>) {
        let result = self.reviews.wont_fix_comment(&review_id, &comment_id).map(|_| Event::Ack);
        let _ = reply.send(result);
    }

    pub(super) fn cmd_update_comment(
        &mut self,
        review_id: String,
        comment_id: String,
        body: String,
        reply: oneshot::Sender<Result<Event, DaemonError>>,
    ) {
        let result = self.reviews.update_comment(&review_id, &comment_id, &body).map(|_| Event::Ack);
        let _ = reply.send(result);
    }

    pub(super) fn cmd_delete_comment(&mut self, review_id: String, comment_id: String, reply: oneshot::Sender<Result<Event, DaemonError>>) {
        let result = self.reviews.delete_comment(&review_id, &comment_id).map(|_| Event::Ack);
        let _ = reply.send(result);
    }
}
