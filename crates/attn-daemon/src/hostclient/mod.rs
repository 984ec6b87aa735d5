// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Code-host client registry: one HTTP client per host, each
//! self-throttled and scraping rate-limit headers off every response. The PR
//! poller drives this module on its cadence; this module never
//! schedules its own polling.

mod bucket;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::domain::{PrRole, RateLimitInfo};
use crate::error::DaemonError;

pub use bucket::TokenBucket;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const BUCKET_CAPACITY: f64 = 60.0;
const BUCKET_REFILL_PER_SEC: f64 = 1.0;

/// A pull request as returned by a host's search endpoint, before the poller
/// merges, dedups, and diffs it against prior state.
#[derive(Debug, Clone)]
pub struct RawPr {
    pub host: String,
    pub repo: String,
    pub number: u64,
    pub title: String,
    pub url: String,
    pub author: String,
    pub draft: bool,
    pub head_branch: String,
    pub head_sha: String,
    pub comment_count: u64,
    /// true if surfaced only via the `reviewed-by:@me` search and not
    /// `review-requested:@me` — the poller's approval inference.
    pub seen_via_reviewed_by_only: bool,
    /// `author` if the PR came back from `author:@me`, `reviewer` otherwise.
    pub role: PrRole,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    number: u64,
    title: String,
    html_url: String,
    draft: bool,
    user: SearchUser,
    comments: u64,
    #[serde(default)]
    pull_request: Option<serde_json::Value>,
    repository_url: String,
}

#[derive(Debug, Deserialize)]
struct SearchUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct PrDetail {
    head: PrDetailHead,
}

#[derive(Debug, Deserialize)]
struct PrDetailHead {
    sha: String,
    #[serde(rename = "ref")]
    ref_name: String,
}

/// One code host: a base URL, a bearer token, and its own rate-limit state.
/// Construction never touches the network.
pub struct HostClient {
    host: String,
    base_url: String,
    token: String,
    http: reqwest::Client,
    bucket: TokenBucket,
    limits: RwLock<HashMap<String, RateLimitInfo>>,
}

impl HostClient {
    /// Builds a client for `host` (an opaque label, e.g. `"github.com"`)
    /// talking to `base_url` (e.g. `https://api.github.com`) with `token`.
    ///
    /// Refuses to construct a client carrying the literal token
    /// `"test-token"` against a base URL that resolves to a public host,
    /// so a copy-pasted test fixture can never reach production.
    pub fn new(host: impl Into<String>, base_url: impl Into<String>, token: impl Into<String>) -> Result<Arc<Self>, DaemonError> {
        let host = host.into();
        let base_url = base_url.into();
        let token = token.into();

        if token == "test-token" && is_public_host(&base_url) {
            return Err(DaemonError::validation(
                "refusing to build a host client: literal test token against a public host",
            ));
        }

        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DaemonError::permanent(format!("building http client for {host}: {e}")))?;

        Ok(Arc::new(Self {
            host,
            base_url,
            token,
            http,
            bucket: TokenBucket::new(BUCKET_CAPACITY, BUCKET_REFILL_PER_SEC),
            limits: RwLock::new(HashMap::new()),
        }))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// True when the last-scraped rate-limit snapshot for `resource` shows
    /// fewer than 5 requests remaining and the reset window hasn't passed.
    pub async fn is_rate_limited(&self, resource: &str) -> bool {
        let limits = self.limits.read().await;
        match limits.get(resource) {
            Some(info) => info.remaining < 5 && info.reset_at > crate::domain::epoch_ms() / 1000,
            None => false,
        }
    }

    pub async fn rate_limit_snapshot(&self, resource: &str) -> Option<RateLimitInfo> {
        self.limits.read().await.get(resource).cloned()
    }

    /// Runs the three merged searches for this host and
    /// returns the union, keyed by nothing in particular — the poller does
    /// the id-based merge.
    pub async fn fetch_prs(&self) -> Result<Vec<RawPr>, DaemonError> {
        let mut out = Vec::new();
        let mut authored_ids = std::collections::HashSet::new();
        let mut reviewed_by_ids = std::collections::HashSet::new();
        let mut requested_ids = std::collections::HashSet::new();

        for (query, role) in [
            ("author:@me", SearchRole::Authored),
            ("review-requested:@me", SearchRole::ReviewRequested),
            ("reviewed-by:@me", SearchRole::ReviewedBy),
        ] {
            let items = self.search_issues(query).await?;
            for item in items {
                if item.pull_request.is_none() {
                    continue;
                }
                if item.draft {
                    continue;
                }
                let repo = repo_from_repository_url(&item.repository_url);
                match role {
                    SearchRole::Authored => {
                        authored_ids.insert((repo.clone(), item.number));
                    }
                    SearchRole::ReviewRequested => {
                        requested_ids.insert((repo.clone(), item.number));
                    }
                    SearchRole::ReviewedBy => {
                        reviewed_by_ids.insert((repo.clone(), item.number));
                    }
                }
                out.push(RawPr {
                    host: self.host.clone(),
                    repo,
                    number: item.number,
                    title: item.title,
                    url: item.html_url,
                    author: item.user.login,
                    draft: item.draft,
                    head_branch: String::new(),
                    head_sha: String::new(),
                    comment_count: item.comments,
                    seen_via_reviewed_by_only: false,
                    role: PrRole::Reviewer,
                });
            }
        }

        // dedup by (repo, number), keeping the first occurrence, and infer
        // approval for PRs seen via reviewed-by but not review-requested.
        let mut seen = std::collections::HashSet::new();
        out.retain(|pr| seen.insert((pr.repo.clone(), pr.number)));
        for pr in out.iter_mut() {
            let key = (pr.repo.clone(), pr.number);
            pr.seen_via_reviewed_by_only = reviewed_by_ids.contains(&key) && !requested_ids.contains(&key);
            pr.role = if authored_ids.contains(&key) { PrRole::Author } else { PrRole::Reviewer };
        }

        Ok(out)
    }

    /// Fetches `head.sha`/`head.ref` and `mergeable_state` for one PR. Returns `(head_sha, head_branch, mergeable_state)`.
    pub async fn fetch_pr_detail(&self, repo: &str, number: u64) -> Result<(String, String, Option<String>), DaemonError> {
        let url = format!("{}/repos/{repo}/pulls/{number}", self.base_url);
        let value = self.get_json(&url).await?;
        let detail: PrDetail = serde_json::from_value(value.clone())
            .map_err(|e| DaemonError::permanent(format!("decoding pr detail: {e}")))?;
        let mergeable_state = value.get("mergeable_state").and_then(|v| v.as_str()).map(str::to_owned);
        Ok((detail.head.sha, detail.head.ref_name, mergeable_state))
    }

    /// `POST /repos/{repo}/pulls/{number}/reviews {event:"APPROVE"}`.
    pub async fn approve_pr(&self, repo: &str, number: u64) -> Result<(), DaemonError> {
        let url = format!("{}/repos/{repo}/pulls/{number}/reviews", self.base_url);
        self.send_json(reqwest::Method::POST, &url, &serde_json::json!({ "event": "APPROVE" })).await?;
        Ok(())
    }

    /// `PUT /repos/{repo}/pulls/{number}/merge`.
    pub async fn merge_pr(&self, repo: &str, number: u64) -> Result<(), DaemonError> {
        let url = format!("{}/repos/{repo}/pulls/{number}/merge", self.base_url);
        self.send_json(reqwest::Method::PUT, &url, &serde_json::json!({})).await?;
        Ok(())
    }

    async fn search_issues(&self, query: &str) -> Result<Vec<SearchItem>, DaemonError> {
        let url = format!("{}/search/issues?q={}", self.base_url, urlencode(query));
        let value = self.get_json(&url).await?;
        let resp: SearchResponse =
            serde_json::from_value(value).map_err(|e| DaemonError::permanent(format!("decoding search response: {e}")))?;
        Ok(resp.items)
    }

    async fn get_json(&self, url: &str) -> Result<serde_json::Value, DaemonError> {
        if !self.bucket.try_acquire() {
            return Err(DaemonError::transient("self rate-limited"));
        }

        let resp = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| DaemonError::transient(format!("request to {url}: {e}")))?;

        self.scrape_rate_limit(&resp).await;

        let status = resp.status();
        if (status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS)
            && resp.headers().get("x-ratelimit-remaining").map(|v| v.as_bytes()) == Some(b"0".as_slice())
        {
            return Err(DaemonError::transient("rate limited by host"));
        }
        if !status.is_success() {
            return Err(DaemonError::permanent(format!("{url} returned {status}")));
        }

        resp.json::<serde_json::Value>()
            .await
            .map_err(|e| DaemonError::permanent(format!("decoding response body: {e}")))
    }

    async fn send_json(&self, method: reqwest::Method, url: &str, body: &serde_json::Value) -> Result<(), DaemonError> {
        if !self.bucket.try_acquire() {
            return Err(DaemonError::transient("self rate-limited"));
        }

        let resp = self
            .http
            .request(method, url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .map_err(|e| DaemonError::transient(format!("request to {url}: {e}")))?;

        self.scrape_rate_limit(&resp).await;

        let status = resp.status();
        if (status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS)
            && resp.headers().get("x-ratelimit-remaining").map(|v| v.as_bytes()) == Some(b"0".as_slice())
        {
            return Err(DaemonError::transient("rate limited by host"));
        }
        if status == StatusCode::CONFLICT {
            return Err(DaemonError::conflict(format!("{url} returned 409"), "merge_conflict"));
        }
        if !status.is_success() {
            return Err(DaemonError::permanent(format!("{url} returned {status}")));
        }
        Ok(())
    }

    async fn scrape_rate_limit(&self, resp: &reqwest::Response) {
        let headers = resp.headers();
        let remaining = headers.get("x-ratelimit-remaining").and_then(|v| v.to_str().ok()).and_then(|v| v.parse::<i64>().ok());
        let reset_at = headers.get("x-ratelimit-reset").and_then(|v| v.to_str().ok()).and_then(|v| v.parse::<u64>().ok());
        let resource = headers
            .get("x-ratelimit-resource")
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
            .unwrap_or_else(|| "core".to_owned());

        if let (Some(remaining), Some(reset_at)) = (remaining, reset_at) {
            let mut limits = self.limits.write().await;
            limits.insert(resource.clone(), RateLimitInfo { host: self.host.clone(), resource, remaining, reset_at });
        }
    }
}

#[derive(Clone, Copy)]
enum SearchRole {
    Authored,
    ReviewRequested,
    ReviewedBy,
}

fn is_public_host(base_url: &str) -> bool {
    base_url.contains("api.github.com") || base_url.contains("gitlab.com") || base_url.contains("bitbucket.org")
}

fn repo_from_repository_url(repository_url: &str) -> String {
    // .../repos/{owner}/{repo} -> "{owner}/{repo}"
    let mut parts = repository_url.rsplit('/');
    let repo = parts.next().unwrap_or_default();
    let owner = parts.next().unwrap_or_default();
    format!("{owner}/{repo}")
}

fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

/// The registry of per-host clients. Guarded by a
/// reader-writer lock since lookups vastly outnumber registrations.
pub struct ClientRegistry {
    clients: RwLock<HashMap<String, Arc<HostClient>>>,
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self { clients: RwLock::new(HashMap::new()) }
    }

    pub async fn register(&self, client: Arc<HostClient>) {
        self.clients.write().await.insert(client.host().to_owned(), client);
    }

    pub async fn remove(&self, host: &str) -> Option<Arc<HostClient>> {
        self.clients.write().await.remove(host)
    }

    pub async fn get(&self, host: &str) -> Option<Arc<HostClient>> {
        self.clients.read().await.get(host).cloned()
    }

    pub async fn hosts(&self) -> Vec<String> {
        self.clients.read().await.keys().cloned().collect()
    }

    /// Fans out `fetch_prs` across every registered host, sequentially.
    /// The first error is captured and returned alongside whatever the
    /// other hosts successfully produced.
    pub async fn fetch_all_prs(&self) -> (Vec<RawPr>, Option<DaemonError>) {
        let snapshot: Vec<Arc<HostClient>> = self.clients.read().await.values().cloned().collect();
        let mut prs = Vec::new();
        let mut first_err = None;
        for client in snapshot {
            match client.fetch_prs().await {
                Ok(mut host_prs) => prs.append(&mut host_prs),
                Err(e) => {
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
            }
        }
        (prs, first_err)
    }

    pub async fn is_any_host_rate_limited(&self, resource: &str) -> bool {
        let snapshot: Vec<Arc<HostClient>> = self.clients.read().await.values().cloned().collect();
        for client in snapshot {
            if client.is_rate_limited(resource).await {
                return true;
            }
        }
        false
    }

    pub async fn approve_pr(&self, host: &str, repo: &str, number: u64) -> Result<(), DaemonError> {
        let client = self.get(host).await.ok_or_else(|| DaemonError::not_found(format!("unknown host {host}")))?;
        client.approve_pr(repo, number).await
    }

    pub async fn merge_pr(&self, host: &str, repo: &str, number: u64) -> Result<(), DaemonError> {
        let client = self.get(host).await.ok_or_else(|| DaemonError::not_found(format!("unknown host {host}")))?;
        client.merge_pr(repo, number).await
    }

    /// Hosts currently rate limited for `resource`, paired with the
    /// `reset_at` from each host's last-scraped snapshot.
    pub async fn get_rate_limited_hosts(&self, resource: &str) -> Vec<(String, u64)> {
        let snapshot: Vec<Arc<HostClient>> = self.clients.read().await.values().cloned().collect();
        let mut hosts = Vec::new();
        for client in snapshot {
            if client.is_rate_limited(resource).await {
                let reset_at = client.rate_limit_snapshot(resource).await.map(|info| info.reset_at).unwrap_or(0);
                hosts.push((client.host().to_owned(), reset_at));
            }
        }
        hosts
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
