// Login retries against a mock HTTP endpoint.

use serde_json::json;
use stampede_core::{login, LoginOutcome, LoginSpec};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn spec(server: &MockServer) -> LoginSpec {
    let mut spec = LoginSpec::new(
        format!("{}/api/login", server.uri()),
        json!({"username": "loadtest", "password": "secret"}),
    );
    spec.retry_delay_ms = 10;
    spec
}

#[tokio::test]
async fn test_token_from_nested_data() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/login"))
        .and(body_json(json!({"username": "loadtest", "password": "secret"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"token": "tok-123"}})))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = login(&reqwest::Client::new(), &spec(&server), None).await;
    assert_eq!(outcome, LoginOutcome::Authenticated("tok-123".to_string()));
}

#[tokio::test]
async fn test_custom_headers_are_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("x-app-platform", "work-space"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": "plain-token"})))
        .mount(&server)
        .await;

    let mut spec = spec(&server);
    spec.headers
        .insert("x-app-platform".to_string(), "work-space".to_string());

    let outcome = login(&reqwest::Client::new(), &spec, None).await;
    assert_eq!(outcome.token(), Some("plain-token"));
}

#[tokio::test]
async fn test_ok_without_token_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"user": "x"}})))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = login(&reqwest::Client::new(), &spec(&server), None).await;
    assert_eq!(outcome, LoginOutcome::NoToken);
}

#[tokio::test]
async fn test_unparsable_body_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = login(&reqwest::Client::new(), &spec(&server), None).await;
    assert_eq!(outcome, LoginOutcome::NoToken);
}

#[tokio::test]
async fn test_server_errors_exhaust_retries() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let outcome = login(&reqwest::Client::new(), &spec(&server), None).await;
    assert_eq!(outcome, LoginOutcome::Exhausted);
    assert!(outcome.should_stop());
}

#[tokio::test]
async fn test_recovers_after_transient_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"access_token": "late"}})))
        .mount(&server)
        .await;

    let outcome = login(&reqwest::Client::new(), &spec(&server), None).await;
    assert_eq!(outcome.token(), Some("late"));
}

#[tokio::test]
async fn test_relative_url_joins_host() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": "t"})))
        .mount(&server)
        .await;

    let spec = LoginSpec::new("/auth", json!({}));
    let outcome = login(&reqwest::Client::new(), &spec, Some(&server.uri())).await;
    assert_eq!(outcome.token(), Some("t"));
}
