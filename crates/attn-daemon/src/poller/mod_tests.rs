use super::*;

use axum::http::HeaderMap;
use axum::routing::get;
use tokio::net::TcpListener;

use crate::domain::{Settings, epoch_ms};
use crate::hostclient::{ClientRegistry, HostClient, RawPr};
use crate::protocol::CoreEvent;

fn raw_pr(number: u64, head_sha: &str, comments: u64, role: PrRole) -> RawPr {
    RawPr {
        host: "github.com".into(),
        repo: "acme/widgets".into(),
        number,
        title: "widget fix".into(),
        url: format!("https://github.com/acme/widgets/pull/{number}"),
        author: "alice".into(),
        draft: false,
        head_branch: "fix".into(),
        head_sha: head_sha.into(),
        comment_count: comments,
        seen_via_reviewed_by_only: false,
        role,
    }
}

fn new_poller() -> (std::sync::Arc<Poller>, tokio::sync::mpsc::UnboundedReceiver<CoreEvent>) {
    let (core_tx, core_rx) = tokio::sync::mpsc::unbounded_channel();
    let (_settings_tx, settings_rx) = tokio::sync::watch::channel(Settings::default());
    let registry = std::sync::Arc::new(ClientRegistry::new());
    (Poller::new(registry, core_tx, settings_rx), core_rx)
}

#[test]
fn first_sighting_of_a_pr_is_hot() {
    let (poller, _rx) = new_poller();
    let now = epoch_ms() / 1000;
    let settings = Settings::default();
    let prs = poller.merge(vec![raw_pr(42, "sha1", 0, PrRole::Reviewer)], now, &settings);

    assert_eq!(prs.len(), 1);
    assert_eq!(prs[0].id, "github.com:acme/widgets#42");
    assert_eq!(prs[0].role, PrRole::Reviewer);
    assert_eq!(prs[0].heat_state, HeatState::Hot);
    assert!(!prs[0].has_new_changes, "first sighting is not a change from a prior cycle");
}

#[test]
fn role_is_derived_from_which_search_surfaced_the_pr() {
    let (poller, _rx) = new_poller();
    let now = epoch_ms() / 1000;
    let settings = Settings::default();
    let prs = poller.merge(vec![raw_pr(7, "sha1", 0, PrRole::Author)], now, &settings);
    assert_eq!(prs[0].role, PrRole::Author);
}

#[test]
fn head_sha_change_marks_has_new_changes_and_resets_heat_to_hot() {
    let (poller, _rx) = new_poller();
    let settings = Settings::default();
    let now = epoch_ms() / 1000;

    poller.merge(vec![raw_pr(42, "sha1", 0, PrRole::Reviewer)], now, &settings);
    let later = now + settings.heat_warm_after_secs + 1;
    let decayed = poller.merge(vec![raw_pr(42, "sha1", 0, PrRole::Reviewer)], later, &settings);
    assert_eq!(decayed[0].heat_state, HeatState::Warm, "no activity for heat_warm_after should decay to warm");

    let changed = poller.merge(vec![raw_pr(42, "sha2", 0, PrRole::Reviewer)], later, &settings);
    assert!(changed[0].has_new_changes);
    assert_eq!(changed[0].heat_state, HeatState::Hot);
}

#[test]
fn pr_dropped_by_the_host_is_dropped_from_shadow_state() {
    let (poller, _rx) = new_poller();
    let settings = Settings::default();
    let now = epoch_ms() / 1000;

    poller.merge(vec![raw_pr(42, "sha1", 0, PrRole::Reviewer)], now, &settings);
    assert_eq!(poller.shadow.lock().len(), 1);

    poller.merge(vec![], now, &settings);
    assert!(poller.shadow.lock().is_empty());
}

#[test]
fn heat_decays_hot_to_warm_to_cold_on_elapsed_time_alone() {
    let now = 0u64;
    let (state, activity) = advance_heat(HeatState::Hot, now, now + 100, false, 6 * 3600, 24 * 3600);
    assert_eq!(state, HeatState::Hot);
    assert_eq!(activity, now);

    let (state, _) = advance_heat(HeatState::Hot, now, now + 6 * 3600, false, 6 * 3600, 24 * 3600);
    assert_eq!(state, HeatState::Warm);

    let (state, _) = advance_heat(HeatState::Warm, now, now + 24 * 3600, false, 6 * 3600, 24 * 3600);
    assert_eq!(state, HeatState::Cold);
}

#[test]
fn a_detected_change_always_jumps_back_to_hot_regardless_of_current_state() {
    let (state, activity) = advance_heat(HeatState::Cold, 0, 10_000, true, 6 * 3600, 24 * 3600);
    assert_eq!(state, HeatState::Hot);
    assert_eq!(activity, 10_000);
}

#[test]
fn jitter_stays_within_the_documented_band() {
    let base = Duration::from_secs(60);
    for _ in 0..200 {
        let got = jitter(base);
        assert!(got.as_secs_f64() >= 60.0 * 0.85 - 0.01);
        assert!(got.as_secs_f64() <= 60.0 * 1.15 + 0.01);
    }
}

async fn spin_rate_limited_fixture() -> (String, tokio::task::JoinHandle<()>) {
    let app = axum::Router::new().route(
        "/search/issues",
        get(|| async {
            let mut headers = HeaderMap::new();
            headers.insert("x-ratelimit-remaining", "0".parse().unwrap());
            headers.insert("x-ratelimit-reset", "9999999999".parse().unwrap());
            headers.insert("x-ratelimit-resource", "search".parse().unwrap());
            let body = serde_json::json!({ "items": [] }).to_string();
            (axum::http::StatusCode::OK, headers, body)
        }),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind fixture listener");
    let addr = listener.local_addr().expect("local addr");
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve fixture");
    });
    (format!("http://{addr}"), handle)
}

#[tokio::test]
async fn rate_limited_event_is_emitted_once_per_transition() {
    let (base_url, _server) = spin_rate_limited_fixture().await;
    let client = HostClient::new("fixture", base_url, "fixture-token").expect("construct client");

    let registry = std::sync::Arc::new(ClientRegistry::new());
    registry.register(client).await;

    let (core_tx, mut core_rx) = tokio::sync::mpsc::unbounded_channel();
    let (_settings_tx, settings_rx) = tokio::sync::watch::channel(Settings::default());
    let poller = Poller::new(registry, core_tx, settings_rx);

    poller.poll_once().await;
    poller.poll_once().await;

    let mut rate_limited_count = 0;
    while let Ok(event) = core_rx.try_recv() {
        if matches!(event, CoreEvent::RateLimited { .. }) {
            rate_limited_count += 1;
        }
    }
    assert_eq!(rate_limited_count, 1, "RateLimited must fire exactly once across repeated cycles in the same state");
}
