// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire protocol for the client hub: the closed set of client→daemon
//! commands and daemon→client events, plus the envelopes the core loop
//! consumes internally.

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::collab::git::{Branch, RepoInfo};
use crate::collab::reviewstore::Comment;
use crate::domain::{Author, Pr, RateLimitInfo, Repo, Session, Settings, Warning};
use crate::error::DaemonError;

/// Client→daemon command discriminators. Every variant's argument
/// schema is fixed; unknown discriminators are rejected at the JSON layer by
/// `serde`'s `deny_unknown_fields`-free default.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    // -- Session lifecycle --------------------------------------------------
    SpawnSession {
        id: String,
        agent: String,
        cwd: String,
        #[serde(default)]
        cols: Option<u16>,
        #[serde(default)]
        rows: Option<u16>,
        #[serde(default)]
        label: Option<String>,
        #[serde(default)]
        resume_session_id: Option<String>,
        #[serde(default)]
        fork_session: bool,
        #[serde(default)]
        executable_override: Option<String>,
    },
    AttachSession {
        id: String,
        #[serde(default)]
        from_seq: Option<u64>,
    },
    DetachSession {
        id: String,
    },
    KillSession {
        id: String,
        #[serde(default)]
        signal: Option<i32>,
    },
    Register {
        id: String,
        agent: String,
        cwd: String,
    },
    Unregister {
        id: String,
    },
    Heartbeat {
        id: u64,
    },
    State {
        id: String,
        state: String,
    },
    Todos {
        id: String,
        todos: Vec<String>,
    },
    Stop {
        id: String,
    },
    Mute {
        id: String,
        muted: bool,
    },
    ClearSessions,
    SessionVisualized {
        id: String,
    },
    PtyInput {
        id: String,
        data: Vec<u8>,
    },
    PtyResize {
        id: String,
        cols: u16,
        rows: u16,
    },

    // -- PRs / repos / authors ------------------------------------------------
    Query,
    QueryPrs,
    QueryRepos,
    QueryAuthors,
    RefreshPrs,
    FetchPrDetails {
        id: String,
    },
    ApprovePr {
        id: String,
    },
    MergePr {
        id: String,
    },
    PrVisited {
        id: String,
    },
    MutePr {
        id: String,
        muted: bool,
    },
    MuteRepo {
        repo: String,
        muted: bool,
    },
    MuteAuthor {
        author: String,
        muted: bool,
    },
    CollapseRepo {
        repo: String,
        collapsed: bool,
    },

    // -- Git / worktrees --------------------------------------------------
    GetRepoInfo {
        repo: String,
    },
    ListBranches {
        repo: String,
    },
    ListRemoteBranches {
        repo: String,
    },
    ListWorktrees {
        repo: String,
    },
    CreateBranch {
        repo: String,
        name: String,
    },
    SwitchBranch {
        repo: String,
        branch: String,
    },
    DeleteBranch {
        repo: String,
        branch: String,
    },
    CreateWorktree {
        repo: String,
        #[serde(default)]
        path: Option<String>,
    },
    CreateWorktreeFromBranch {
        repo: String,
        branch: String,
        #[serde(default)]
        path: Option<String>,
    },
    DeleteWorktree {
        path: String,
    },
    CheckDirty {
        repo: String,
    },
    CheckAttnStash {
        repo: String,
        branch: String,
    },
    Stash {
        repo: String,
        #[serde(default)]
        message: Option<String>,
    },
    StashPop {
        repo: String,
    },
    CommitWip {
        repo: String,
    },
    FetchRemotes {
        repo: String,
    },
    GetDefaultBranch {
        repo: String,
    },
    SubscribeGitStatus {
        dir: String,
    },
    UnsubscribeGitStatus {
        dir: String,
    },
    GetFileDiff {
        repo: String,
        path: String,
        #[serde(default)]
        base: Option<String>,
    },
    GetBranchDiffFiles {
        repo: String,
        branch: String,
    },
    EnsureRepo {
        target_path: String,
        clone_url: String,
    },
    GetRecentLocations,

    // -- Review ---------------------------------------------------------
    StartReview {
        pr_id: String,
    },
    CancelReview {
        review_id: String,
    },
    GetReviewState {
        review_id: String,
    },
    MarkFileViewed {
        review_id: String,
        path: String,
    },
    AddComment {
        review_id: String,
        path: String,
        line: u64,
        body: String,
    },
    GetComments {
        review_id: String,
    },
    ResolveComment {
        review_id: String,
        comment_id: String,
    },
    WontFixComment {
        review_id: String,
        comment_id: String,
    },
    UpdateComment {
        review_id: String,
        comment_id: String,
        body: String,
    },
    DeleteComment {
        review_id: String,
        comment_id: String,
    },

    // -- Settings / ops ---------------------------------------------------
    GetSettings,
    SetSetting {
        key: String,
        value: serde_json::Value,
    },
    ClearWarnings,
    InjectTestPr {
        pr: Pr,
    },
    InjectTestSession {
        session: Session,
    },

    /// Internal only: the hub uses this to ask the core for an
    /// `initial_state` frame on client connect. Never present on the wire —
    /// `serde` can construct it from within the process but will never
    /// produce it from incoming JSON, so an attacker-controlled `cmd` value
    /// can never reach the core through this variant.
    #[serde(skip_deserializing)]
    Snapshot,
}

impl Command {
    /// The `cmd` discriminator as it appears on the wire, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SpawnSession { .. } => "spawn_session",
            Self::AttachSession { .. } => "attach_session",
            Self::DetachSession { .. } => "detach_session",
            Self::KillSession { .. } => "kill_session",
            Self::Register { .. } => "register",
            Self::Unregister { .. } => "unregister",
            Self::Heartbeat { .. } => "heartbeat",
            Self::State { .. } => "state",
            Self::Todos { .. } => "todos",
            Self::Stop { .. } => "stop",
            Self::Mute { .. } => "mute",
            Self::ClearSessions => "clear_sessions",
            Self::SessionVisualized { .. } => "session_visualized",
            Self::PtyInput { .. } => "pty_input",
            Self::PtyResize { .. } => "pty_resize",
            Self::Query => "query",
            Self::QueryPrs => "query_prs",
            Self::QueryRepos => "query_repos",
            Self::QueryAuthors => "query_authors",
            Self::RefreshPrs => "refresh_prs",
            Self::FetchPrDetails { .. } => "fetch_pr_details",
            Self::ApprovePr { .. } => "approve_pr",
            Self::MergePr { .. } => "merge_pr",
            Self::PrVisited { .. } => "pr_visited",
            Self::MutePr { .. } => "mute_pr",
            Self::MuteRepo { .. } => "mute_repo",
            Self::MuteAuthor { .. } => "mute_author",
            Self::CollapseRepo { .. } => "collapse_repo",
            Self::GetRepoInfo { .. } => "get_repo_info",
            Self::ListBranches { .. } => "list_branches",
            Self::ListRemoteBranches { .. } => "list_remote_branches",
            Self::ListWorktrees { .. } => "list_worktrees",
            Self::CreateBranch { .. } => "create_branch",
            Self::SwitchBranch { .. } => "switch_branch",
            Self::DeleteBranch { .. } => "delete_branch",
            Self::CreateWorktree { .. } => "create_worktree",
            Self::CreateWorktreeFromBranch { .. } => "create_worktree_from_branch",
            Self::DeleteWorktree { .. } => "delete_worktree",
            Self::CheckDirty { .. } => "check_dirty",
            Self::CheckAttnStash { .. } => "check_attn_stash",
            Self::Stash { .. } => "stash",
            Self::StashPop { .. } => "stash_pop",
            Self::CommitWip { .. } => "commit_wip",
            Self::FetchRemotes { .. } => "fetch_remotes",
            Self::GetDefaultBranch { .. } => "get_default_branch",
            Self::SubscribeGitStatus { .. } => "subscribe_git_status",
            Self::UnsubscribeGitStatus { .. } => "unsubscribe_git_status",
            Self::GetFileDiff { .. } => "get_file_diff",
            Self::GetBranchDiffFiles { .. } => "get_branch_diff_files",
            Self::EnsureRepo { .. } => "ensure_repo",
            Self::GetRecentLocations => "get_recent_locations",
            Self::StartReview { .. } => "start_review",
            Self::CancelReview { .. } => "cancel_review",
            Self::GetReviewState { .. } => "get_review_state",
            Self::MarkFileViewed { .. } => "mark_file_viewed",
            Self::AddComment { .. } => "add_comment",
            Self::GetComments { .. } => "get_comments",
            Self::ResolveComment { .. } => "resolve_comment",
            Self::WontFixComment { .. } => "wont_fix_comment",
            Self::UpdateComment { .. } => "update_comment",
            Self::DeleteComment { .. } => "delete_comment",
            Self::GetSettings => "get_settings",
            Self::SetSetting { .. } => "set_setting",
            Self::ClearWarnings => "clear_warnings",
            Self::InjectTestPr { .. } => "inject_test_pr",
            Self::InjectTestSession { .. } => "inject_test_session",
            Self::Snapshot => "snapshot",
        }
    }
}

/// Daemon→client event discriminators, broadcast to every
/// connected client or (for `*_result` shapes) returned to the originator.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    InitialState {
        sessions: Vec<Session>,
        prs: Vec<Pr>,
        repos: Vec<Repo>,
        authors: Vec<Author>,
        settings: Settings,
        warnings: Vec<Warning>,
        daemon_instance_id: String,
        protocol_version: u32,
    },
    SessionsUpdated {
        sessions: Vec<Session>,
    },
    SessionRegistered {
        session: Session,
    },
    SessionUnregistered {
        id: String,
    },
    SessionStateChanged {
        id: String,
        state: String,
        state_since: u64,
    },
    SessionTodosUpdated {
        id: String,
        todos: Vec<String>,
    },
    SessionExited {
        id: String,
        code: Option<i32>,
        signal: Option<i32>,
    },
    BranchChanged {
        repo: String,
        branch: String,
    },
    PrsUpdated {
        prs: Vec<Pr>,
    },
    ReposUpdated {
        repos: Vec<Repo>,
    },
    AuthorsUpdated {
        authors: Vec<Author>,
    },
    WorktreeCreated {
        repo: String,
        path: String,
    },
    WorktreeDeleted {
        repo: String,
        path: String,
    },
    WorktreesUpdated {
        repo: String,
        worktrees: Vec<String>,
    },
    WarningsUpdated {
        warnings: Vec<Warning>,
    },
    SettingsUpdated {
        settings: Settings,
    },
    GitStatusUpdate {
        dir: String,
        dirty: bool,
    },
    PtyOutput {
        id: String,
        seq: u64,
        data: Vec<u8>,
    },
    PtyDesync {
        id: String,
        reason: String,
    },
    AttachResult {
        id: String,
        running: bool,
        last_seq: u64,
        state: String,
    },
    SpawnResult {
        id: String,
        ok: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    RateLimited {
        host: String,
        resource: String,
        reset_at: u64,
    },
    CommandError {
        cmd: String,
        error: String,
    },
    QueryResult {
        sessions: Vec<Session>,
        prs: Vec<Pr>,
        repos: Vec<Repo>,
        authors: Vec<Author>,
    },
    SettingsResult {
        settings: Settings,
    },
    Ack,
    RepoInfoResult {
        repo: String,
        info: RepoInfo,
    },
    BranchesResult {
        repo: String,
        branches: Vec<Branch>,
    },
    WorktreesResult {
        repo: String,
        worktrees: Vec<String>,
    },
    DirtyResult {
        repo: String,
        dirty: bool,
    },
    AttnStashResult {
        repo: String,
        branch: String,
        found: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        stash_ref: Option<String>,
    },
    StashPopResult {
        repo: String,
        conflict: bool,
    },
    DefaultBranchResult {
        repo: String,
        branch: String,
    },
    FileDiffResult {
        repo: String,
        path: String,
        diff: String,
    },
    BranchDiffFilesResult {
        repo: String,
        branch: String,
        files: Vec<String>,
    },
    EnsureRepoResult {
        target_path: String,
        cloned: bool,
    },
    RecentLocationsResult {
        locations: Vec<String>,
    },
    ReviewStateResult {
        review_id: String,
        pr_id: String,
        cancelled: bool,
        viewed_files: Vec<String>,
        comments: Vec<Comment>,
    },
    CommentsResult {
        review_id: String,
        comments: Vec<Comment>,
    },
    CommentResult {
        review_id: String,
        comment: Comment,
    },
    ReviewStarted {
        review_id: String,
        pr_id: String,
    },
    ReviewChunk {
        review_id: String,
        text: String,
    },
    ReviewFinding {
        review_id: String,
        path: String,
        line: u64,
        body: String,
    },
    ReviewToolUse {
        review_id: String,
        tool: String,
    },
    ReviewComplete {
        review_id: String,
    },
    ReviewCancelled {
        review_id: String,
    },
    ReviewCommentResolved {
        review_id: String,
        comment_id: String,
    },
    PrDetailsResult {
        id: String,
        head_sha: String,
        head_branch: String,
        ci_status: crate::domain::CiStatus,
    },
}

/// A client-originated command, paired with a reply channel the core loop
/// must use exactly once.
pub struct CommandEnvelope {
    pub command: Command,
    pub reply: oneshot::Sender<Result<Event, DaemonError>>,
}

/// A background-actor-originated event with no reply.
#[derive(Debug)]
pub enum CoreEvent {
    WorkerOutput { id: String, seq: u64, data: Vec<u8> },
    WorkerState { id: String, state: crate::domain::SessionState },
    WorkerExited { id: String, code: Option<i32>, signal: Option<i32> },
    WorkerUnreachable { id: String },
    SessionEvicted { id: String, reason: String },
    SessionRecovered { id: String, agent: String, cwd: String },
    /// `spawn_session` finished on the supervisor: the
    /// core inserts the new `Session` and broadcasts `session_registered`.
    SessionSpawned { id: String, agent: String, cwd: String, cols: u16, rows: u16 },
    PrsRefreshed { prs: Vec<Pr> },
    RateLimited { host: String, resource: String, reset_at: u64 },
    PollWarning { code: String, message: String },
    /// A PR detail fetch finished; carries the mapped `ci_status`
    /// and review-state fields the core merges into its copy of the PR.
    PrDetailsFetched { id: String, head_sha: String, head_branch: String, ci_status: crate::domain::CiStatus },
    /// A long-running git/filesystem operation
    /// finished and wants a broadcast to every client.
    GitOpBroadcast(GitOpBroadcast),
    /// One tick of a `subscribe_git_status` watcher.
    GitStatusTick { dir: String, dirty: bool },
}

/// Broadcast-worthy outcomes of an offloaded git operation. Kept
/// distinct from the command's direct reply, which carries the same data
/// back to the originator only.
#[derive(Debug, Clone)]
pub enum GitOpBroadcast {
    BranchChanged { repo: String, branch: String },
    WorktreeCreated { repo: String, path: String, worktrees: Vec<String> },
    WorktreeDeleted { repo: String, path: String, worktrees: Vec<String> },
}

pub const PROTOCOL_VERSION: u32 = 1;
