//! Agent against real HTTP servers: an upstream API and a mock collector.

use bearer_agent::{Agent, AgentError, DeliveryMode, RecordType, ReportLog};
use bytes::Bytes;
use http::{Request, StatusCode};
use http_body_util::{BodyExt, Full};
use httpmock::prelude::*;
use std::collections::BTreeMap;
use std::time::Duration;
use tower::ServiceExt;

fn agent_for(collector: &MockServer, secret_key: &str) -> Agent {
    Agent::builder()
        .secret_key(secret_key)
        .logs_url(collector.url("/logs"))
        .config_url(collector.url("/config"))
        .allow_insecure_http()
        .build()
        .unwrap()
}

fn get(url: &str) -> Request<Full<Bytes>> {
    Request::builder()
        .method("GET")
        .uri(url)
        .body(Full::new(Bytes::new()))
        .unwrap()
}

fn sample_record() -> ReportLog {
    ReportLog {
        protocol: "https".to_owned(),
        path: "/sample".to_owned(),
        hostname: "api.example.com".to_owned(),
        method: "GET".to_owned(),
        started_at: 1_700_000_000_000,
        ended_at: 1_700_000_000_080,
        kind: RecordType::RequestEnd,
        status_code: 200,
        url: "http://api.example.com/sample".to_owned(),
        request_headers: BTreeMap::from([("Accept".to_owned(), "application/json".to_owned())]),
        request_body: r#"{"body":"data"}"#.to_owned(),
        response_headers: BTreeMap::from([(
            "Content-Type".to_owned(),
            "application/json".to_owned(),
        )]),
        response_body: r#"{"ok":true}"#.to_owned(),
    }
}

#[tokio::test]
async fn test_intercepted_request_is_shipped_once() {
    let upstream = MockServer::start();
    let api = upstream.mock(|when, then| {
        when.method(GET).path("/sample");
        then.status(200)
            .header("Hello", "World")
            .body("200 OKHello World!");
    });

    let collector = MockServer::start();
    let logs = collector.mock(|when, then| {
        when.method(POST)
            .path("/logs")
            .header("accept", "application/json")
            .header("content-type", "application/json");
        then.status(200).body("{}");
    });

    let agent = agent_for(&collector, "sk_test");
    let response = agent
        .service()
        .oneshot(get(&upstream.url("/sample")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["hello"], "World");
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"200 OKHello World!");

    api.assert_calls(1);
    logs.assert_calls(1);
}

#[tokio::test]
async fn test_empty_secret_key_never_contacts_collector() {
    let upstream = MockServer::start();
    let api = upstream.mock(|when, then| {
        when.method(GET).path("/sample");
        then.status(200)
            .header("Hello", "World")
            .body("200 OKHello World!");
    });

    let collector = MockServer::start();
    let logs = collector.mock(|when, then| {
        when.path("/logs");
        then.status(200);
    });
    let config = collector.mock(|when, then| {
        when.path("/config");
        then.status(200).body("{}");
    });

    let agent = agent_for(&collector, "");
    let response = agent
        .service()
        .oneshot(get(&upstream.url("/sample")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"200 OKHello World!");

    api.assert_calls(1);
    logs.assert_calls(0);
    config.assert_calls(0);
}

#[tokio::test]
async fn test_default_service_reaches_plain_http_upstream() {
    let upstream = MockServer::start();
    let api = upstream.mock(|when, then| {
        when.method(GET).path("/sample");
        then.status(200).body("200 OKHello World!");
    });

    // Collector transport stays TLS-only; the intercepted client is not bound by it
    let agent = Agent::builder().build().unwrap();
    let response = agent
        .service()
        .oneshot(get(&upstream.url("/sample")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"200 OKHello World!");
    api.assert_calls(1);
}

#[tokio::test]
async fn test_collector_rejection_leaves_response_intact() {
    let upstream = MockServer::start();
    upstream.mock(|when, then| {
        when.method(GET).path("/orders");
        then.status(201).body("created");
    });

    let collector = MockServer::start();
    let logs = collector.mock(|when, then| {
        when.method(POST).path("/logs");
        then.status(401).body(r#"{"code":"UNAUTHORIZED"}"#);
    });

    let agent = agent_for(&collector, "sk_invalid");
    let response = agent
        .service()
        .oneshot(get(&upstream.url("/orders")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"created");
    logs.assert_calls(1);
}

#[tokio::test]
async fn test_unreachable_upstream_error_is_not_reported() {
    let collector = MockServer::start();
    let logs = collector.mock(|when, then| {
        when.path("/logs");
        then.status(200);
    });

    let agent = agent_for(&collector, "sk_test");
    // Port 9 (discard) on loopback is not expected to accept connections
    let result = agent.service().oneshot(get("http://127.0.0.1:9/")).await;

    assert!(matches!(result, Err(AgentError::Transport(_))));
    logs.assert_calls(0);
}

#[tokio::test]
async fn test_log_records_against_collector() {
    let collector = MockServer::start();
    let logs = collector.mock(|when, then| {
        when.method(POST).path("/logs");
        then.status(200);
    });

    let agent = agent_for(&collector, "sk_test");
    agent.log_records(&[sample_record()]).await.unwrap();
    agent.log_records(&[]).await.unwrap();

    logs.assert_calls(1);
}

#[tokio::test]
async fn test_log_records_unexpected_status() {
    let collector = MockServer::start();
    collector.mock(|when, then| {
        when.method(POST).path("/logs");
        then.status(403);
    });

    let agent = agent_for(&collector, "sk_test");
    let result = agent.log_records(&[sample_record()]).await;

    match result {
        Err(AgentError::UnexpectedStatus(status)) => assert_eq!(status, StatusCode::FORBIDDEN),
        other => panic!("Expected UnexpectedStatus, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_config_fetch() {
    let collector = MockServer::start();
    let config = collector.mock(|when, then| {
        when.method(GET)
            .path("/config")
            .header("authorization", "sk_test")
            .header("accept", "application/json");
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"rules":[{"filter":"api.example.com"}],"dataCollectionRules":[]}"#);
    });

    let agent = agent_for(&collector, "sk_test");
    let remote = agent.config().await.unwrap();

    config.assert_calls(1);
    assert_eq!(remote.get("rules").unwrap()[0]["filter"], "api.example.com");
    assert_eq!(remote.as_map().len(), 2);
}

#[tokio::test]
async fn test_config_fetch_invalid_body() {
    let collector = MockServer::start();
    collector.mock(|when, then| {
        when.method(GET).path("/config");
        then.status(500).body("internal error");
    });

    let agent = agent_for(&collector, "sk_test");
    let result = agent.config().await;

    assert!(matches!(result, Err(AgentError::Json(_))));
}

#[tokio::test]
async fn test_background_delivery_ships_after_response() {
    let upstream = MockServer::start();
    upstream.mock(|when, then| {
        when.method(GET).path("/sample");
        then.status(200).body("ok");
    });

    let collector = MockServer::start();
    let logs = collector.mock(|when, then| {
        when.method(POST).path("/logs");
        then.status(200);
    });

    let agent = Agent::builder()
        .secret_key("sk_test")
        .logs_url(collector.url("/logs"))
        .allow_insecure_http()
        .delivery(DeliveryMode::Background { capacity: 16 })
        .build()
        .unwrap();

    let response = agent
        .service()
        .oneshot(get(&upstream.url("/sample")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    for _ in 0..200 {
        if logs.calls() > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    logs.assert_calls(1);
}
