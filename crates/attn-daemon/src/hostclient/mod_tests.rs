use super::*;

use axum::http::HeaderMap;
use axum::routing::get;
use tokio::net::TcpListener;

#[test]
fn safety_rule_refuses_test_token_against_a_public_host() {
    let result = HostClient::new("github.com", "https://api.github.com", "test-token");
    assert!(result.is_err());
}

#[test]
fn safety_rule_allows_test_token_against_a_local_fixture() {
    let result = HostClient::new("fixture", "http://127.0.0.1:0", "test-token");
    assert!(result.is_ok());
}

async fn spin_fixture(remaining: &'static str, reset: &'static str, status: axum::http::StatusCode) -> (String, tokio::task::JoinHandle<()>) {
    let app = axum::Router::new().route(
        "/search/issues",
        get(move || async move {
            let mut headers = HeaderMap::new();
            headers.insert("x-ratelimit-remaining", remaining.parse().unwrap());
            headers.insert("x-ratelimit-reset", reset.parse().unwrap());
            headers.insert("x-ratelimit-resource", "search".parse().unwrap());
            let body = serde_json::json!({ "items": [] }).to_string();
            (status, headers, body)
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
async fn scrapes_rate_limit_headers_from_a_fixture() {
    let (base_url, _server) = spin_fixture("42", "9999999999", axum::http::StatusCode::OK).await;
    let client = HostClient::new("fixture", base_url, "fixture-token").expect("construct client");

    let prs = client.fetch_prs().await.expect("fetch_prs");
    assert!(prs.is_empty());

    let snapshot = client.rate_limit_snapshot("search").await.expect("snapshot recorded");
    assert_eq!(snapshot.remaining, 42);
    assert!(!client.is_rate_limited("search").await);
}

#[tokio::test]
async fn low_remaining_marks_the_resource_rate_limited() {
    let (base_url, _server) = spin_fixture("2", "9999999999", axum::http::StatusCode::OK).await;
    let client = HostClient::new("fixture", base_url, "fixture-token").expect("construct client");

    client.fetch_prs().await.expect("fetch_prs");
    assert!(client.is_rate_limited("search").await);
}

#[tokio::test]
async fn exhausted_bucket_yields_transient_error_without_a_request() {
    let (base_url, _server) = spin_fixture("99", "9999999999", axum::http::StatusCode::OK).await;
    let client = HostClient::new("fixture", base_url, "fixture-token").expect("construct client");

    for _ in 0..60 {
        let _ = client.fetch_prs().await;
    }
    let err = client.fetch_prs().await.expect_err("bucket should be exhausted by now");
    assert!(matches!(err, DaemonError::Transient { .. }));
}

#[tokio::test]
async fn forbidden_with_zero_remaining_maps_to_rate_limited_error() {
    let (base_url, _server) = spin_fixture("0", "9999999999", axum::http::StatusCode::FORBIDDEN).await;
    let client = HostClient::new("fixture", base_url, "fixture-token").expect("construct client");

    let err = client.fetch_prs().await.expect_err("403 with zero remaining should error");
    assert!(matches!(err, DaemonError::Transient { .. }));
}
