//! End-to-end relay tests
//!
//! Each test spawns a relay on an OS-assigned loopback port and talks to it
//! over real HTTP with reqwest.

use std::time::{Duration, Instant};

use axum::routing::{get, post};
use axum::Router;
use relay_client::RelayClient;
use relay_core::AllowedOrigins;
use relay_server::{RelayConfig, RelayServer};
use reqwest::{Client, Method, Response, StatusCode};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::net::TcpListener;

const ALLOWED: &str = "https://lkamols.github.io";
const FORBIDDEN: &str = "https://evil.example";

/// A running relay plus a scratch directory for file operations
pub struct TestHarness {
    pub port: u16,
    pub url: String,
    pub http: Client,
    pub dir: TempDir,
    _shutdown: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestHarness {
    pub async fn new() -> Self {
        Self::with_timeout(Duration::from_secs(1)).await
    }

    pub async fn with_timeout(timeout: Duration) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Bind should succeed");
        let port = listener.local_addr().expect("local addr").port();

        let config = RelayConfig::new(AllowedOrigins::new(["null", ALLOWED]), timeout, port);
        let server = RelayServer::from_listener(listener, config).expect("Relay should build");

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        tokio::spawn(async move {
            server
                .run_until(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        Self {
            port,
            url: format!("http://127.0.0.1:{}", port),
            http: Client::builder()
                .pool_max_idle_per_host(0)
                .build()
                .expect("client"),
            dir: tempfile::tempdir().expect("tempdir"),
            _shutdown: Some(shutdown_tx),
        }
    }

    /// POST an operation envelope with the given origin
    pub async fn operation(&self, origin: &str, body: &Value) -> reqwest::Result<Response> {
        self.http
            .post(&self.url)
            .header("Origin", origin)
            .header("Content-Type", "application/json")
            .body(body.to_string())
            .send()
            .await
    }

    /// POST a raw body with the given origin
    pub async fn raw(&self, origin: &str, body: &str) -> reqwest::Result<Response> {
        self.http
            .post(&self.url)
            .header("Origin", origin)
            .body(body.to_string())
            .send()
            .await
    }

    pub async fn preflight(&self, origin: &str) -> reqwest::Result<Response> {
        self.http
            .request(Method::OPTIONS, &self.url)
            .header("Origin", origin)
            .header("Access-Control-Request-Method", "POST")
            .header("Access-Control-Request-Headers", "content-type")
            .send()
            .await
    }

    pub async fn discover(&self) -> reqwest::Result<Response> {
        self.operation(ALLOWED, &json!({"type": "DISCOVER"})).await
    }

    /// Absolute path of a file in the scratch directory
    pub fn path(&self, name: &str) -> String {
        self.dir.path().join(name).to_string_lossy().into_owned()
    }
}

fn allow_origin(response: &Response) -> Option<&str> {
    response
        .headers()
        .get("access-control-allow-origin")
        .and_then(|v| v.to_str().ok())
}

/// Port with nothing listening on it
fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Upstream device that answers like a charger's HTTP API
async fn spawn_upstream() -> u16 {
    let router = Router::new()
        .route("/info", get(|| async { r#"{"id": "charger-1", "cells": 16}"# }))
        .route("/config", post(|body: String| async move { body }));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });
    port
}

/// Upstream that accepts connections and never answers
async fn spawn_silent_upstream() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(60)).await;
                drop(stream);
            });
        }
    });
    port
}

// ============================================================================
// CORS
// ============================================================================

#[tokio::test]
async fn test_preflight_allowed_origin() {
    let harness = TestHarness::new().await;
    let resp = harness.preflight(ALLOWED).await.expect("preflight");

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(allow_origin(&resp), Some(ALLOWED));
    assert_eq!(
        resp.headers()["access-control-allow-methods"],
        "POST, OPTIONS"
    );
    assert_eq!(resp.headers()["access-control-allow-headers"], "Content-Type");
}

#[tokio::test]
async fn test_preflight_null_origin() {
    let harness = TestHarness::new().await;
    let resp = harness.preflight("null").await.expect("preflight");
    assert_eq!(allow_origin(&resp), Some("null"));
}

#[tokio::test]
async fn test_preflight_forbidden_origin_has_no_cors_headers() {
    let harness = TestHarness::new().await;
    let resp = harness.preflight(FORBIDDEN).await.expect("preflight");

    assert!(allow_origin(&resp).is_none());
    assert!(resp.headers().get("access-control-allow-methods").is_none());
}

#[tokio::test]
async fn test_post_forbidden_origin_is_dropped() {
    let harness = TestHarness::new().await;
    let path = harness.path("should-not-exist.txt");

    let result = harness
        .operation(
            FORBIDDEN,
            &json!({"type": "WRITE", "location": path, "body": "x"}),
        )
        .await;

    assert!(result.is_err(), "Forbidden origin should get no response");
    assert!(!std::path::Path::new(&path).exists());
}

#[tokio::test]
async fn test_post_without_origin_is_dropped() {
    let harness = TestHarness::new().await;
    let result = harness
        .http
        .post(&harness.url)
        .body(json!({"type": "DISCOVER"}).to_string())
        .send()
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_get_method_is_ignored() {
    let harness = TestHarness::new().await;
    let result = harness
        .http
        .get(&harness.url)
        .header("Origin", ALLOWED)
        .send()
        .await;
    assert!(result.is_err());
}

// ============================================================================
// DISCOVER
// ============================================================================

#[tokio::test]
async fn test_discover() {
    let harness = TestHarness::new().await;
    let resp = harness.discover().await.expect("discover");

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(allow_origin(&resp), Some(ALLOWED));
    assert_eq!(resp.headers()["content-type"], "application/json");
    assert_eq!(resp.text().await.unwrap(), r#"{"discover": 1}"#);
}

#[tokio::test]
async fn test_discover_ignores_other_fields() {
    let harness = TestHarness::new().await;
    let resp = harness
        .operation(
            "null",
            &json!({"type": "DISCOVER", "location": "/etc/hostname", "body": "x"}),
        )
        .await
        .expect("discover");

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), r#"{"discover": 1}"#);
}

#[tokio::test]
async fn test_discover_with_mistyped_fields() {
    let harness = TestHarness::new().await;
    let resp = harness
        .operation(
            ALLOWED,
            &json!({"type": "DISCOVER", "location": 5, "body": {"a": 1}}),
        )
        .await
        .expect("discover");

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), r#"{"discover": 1}"#);
}

#[tokio::test]
async fn test_discover_with_url_and_location() {
    let harness = TestHarness::new().await;
    let resp = harness
        .operation(
            ALLOWED,
            &json!({"type": "DISCOVER", "location": "a", "url": "b"}),
        )
        .await
        .expect("discover");

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), r#"{"discover": 1}"#);
}

// ============================================================================
// File operations
// ============================================================================

#[tokio::test]
async fn test_write_then_read_round_trip() {
    let harness = TestHarness::new().await;
    let path = harness.path("ipAddresses.txt");
    let data = r#"{"ipAddresses": ["192.168.0.12", "192.168.0.40"]}"#;

    let resp = harness
        .operation(
            ALLOWED,
            &json!({"type": "WRITE", "location": path, "body": data}),
        )
        .await
        .expect("write");
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(allow_origin(&resp), Some(ALLOWED));
    assert!(resp.bytes().await.unwrap().is_empty());

    let resp = harness
        .operation(ALLOWED, &json!({"type": "READ", "location": path}))
        .await
        .expect("read");
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), data);
}

#[tokio::test]
async fn test_read_missing_file_is_404() {
    let harness = TestHarness::new().await;
    let resp = harness
        .operation(
            ALLOWED,
            &json!({"type": "READ", "location": harness.path("missing.json")}),
        )
        .await
        .expect("read");

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(allow_origin(&resp), Some(ALLOWED));
    assert!(resp.bytes().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_concurrent_writes_to_distinct_paths() {
    let harness = TestHarness::new().await;
    let first = harness.path("first.json");
    let second = harness.path("second.json");

    let write_first = json!({"type": "WRITE", "location": first, "body": "[1]"});
    let write_second = json!({"type": "WRITE", "location": second, "body": "[2]"});

    let (a, b) = tokio::join!(
        harness.operation(ALLOWED, &write_first),
        harness.operation(ALLOWED, &write_second),
    );

    assert_eq!(a.expect("first write").status(), StatusCode::OK);
    assert_eq!(b.expect("second write").status(), StatusCode::OK);
    assert_eq!(std::fs::read_to_string(&first).unwrap(), "[1]");
    assert_eq!(std::fs::read_to_string(&second).unwrap(), "[2]");
}

// ============================================================================
// Remote operations
// ============================================================================

#[tokio::test]
async fn test_remote_get() {
    let harness = TestHarness::new().await;
    let upstream = spawn_upstream().await;

    let resp = harness
        .operation(
            ALLOWED,
            &json!({"type": "GET", "location": format!("http://127.0.0.1:{}/info", upstream)}),
        )
        .await
        .expect("get");

    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["id"], "charger-1");
}

#[tokio::test]
async fn test_remote_post_forwards_body() {
    let harness = TestHarness::new().await;
    let upstream = spawn_upstream().await;
    let payload = r#"{"MaV": 4.2, "MiV": 3.2}"#;

    let resp = harness
        .operation(
            ALLOWED,
            &json!({
                "type": "POST",
                "location": format!("http://127.0.0.1:{}/config", upstream),
                "body": payload,
            }),
        )
        .await
        .expect("post");

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), payload);
}

#[tokio::test]
async fn test_legacy_url_field() {
    let harness = TestHarness::new().await;
    let upstream = spawn_upstream().await;

    let resp = harness
        .operation(
            ALLOWED,
            &json!({"type": "GET", "url": format!("http://127.0.0.1:{}/info", upstream)}),
        )
        .await
        .expect("get");
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_remote_get_unreachable_is_404() {
    let harness = TestHarness::new().await;
    let resp = harness
        .operation(
            ALLOWED,
            &json!({"type": "GET", "location": format!("http://127.0.0.1:{}/", closed_port())}),
        )
        .await
        .expect("get");

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(allow_origin(&resp), Some(ALLOWED));
}

#[tokio::test]
async fn test_remote_get_timeout_is_404() {
    let harness = TestHarness::with_timeout(Duration::from_secs(1)).await;
    let upstream = spawn_silent_upstream().await;

    let started = Instant::now();
    let resp = harness
        .operation(
            ALLOWED,
            &json!({"type": "GET", "location": format!("http://127.0.0.1:{}/", upstream)}),
        )
        .await
        .expect("get");

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert!(started.elapsed() >= Duration::from_millis(900));
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn test_slow_get_does_not_delay_discover() {
    let harness = TestHarness::with_timeout(Duration::from_secs(3)).await;
    let upstream = spawn_silent_upstream().await;

    let slow_request = json!({
        "type": "POST",
        "location": format!("http://127.0.0.1:{}/", upstream),
        "body": "{}",
    });
    let slow = harness.operation(ALLOWED, &slow_request);
    let quick = async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let started = Instant::now();
        let resp = harness.discover().await.expect("discover");
        (resp.status(), started.elapsed())
    };

    let (slow, (quick_status, quick_elapsed)) = tokio::join!(slow, quick);

    assert_eq!(quick_status, StatusCode::OK);
    assert!(quick_elapsed < Duration::from_secs(1), "DISCOVER took {:?}", quick_elapsed);
    assert_eq!(slow.expect("slow post").status(), StatusCode::NOT_FOUND);
}

// ============================================================================
// Error isolation
// ============================================================================

#[tokio::test]
async fn test_malformed_json_is_dropped_and_server_continues() {
    let harness = TestHarness::new().await;

    assert!(harness.raw(ALLOWED, "not json").await.is_err());
    assert!(harness.raw(ALLOWED, r#"{"location": "/tmp/x"}"#).await.is_err());
    assert!(harness.raw(ALLOWED, r#"{"type": "READ"}"#).await.is_err());
    assert!(harness
        .raw(ALLOWED, r#"{"type": "UPLOAD", "location": "/tmp/x"}"#)
        .await
        .is_err());

    let resp = harness.discover().await.expect("discover after errors");
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_failed_operation_does_not_affect_next() {
    let harness = TestHarness::new().await;

    let resp = harness
        .operation(
            ALLOWED,
            &json!({"type": "READ", "location": harness.path("nope")}),
        )
        .await
        .expect("read");
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = harness.discover().await.expect("discover");
    assert_eq!(resp.status(), StatusCode::OK);
}

// ============================================================================
// Client
// ============================================================================

#[tokio::test]
async fn test_client_discovers_relay_port() {
    let harness = TestHarness::new().await;

    let mut client = RelayClient::new(ALLOWED).with_host("127.0.0.1");
    let port = client
        .discover(&[closed_port(), harness.port])
        .await
        .expect("discover");
    assert_eq!(port, harness.port);
    assert!(client.ping().await.expect("ping"));
}

#[tokio::test]
async fn test_client_forbidden_origin_finds_nothing() {
    let harness = TestHarness::new().await;

    let mut client = RelayClient::new(FORBIDDEN).with_host("127.0.0.1");
    assert!(client.discover(&[harness.port]).await.is_err());
}

#[tokio::test]
async fn test_client_json_file_round_trip() {
    let harness = TestHarness::new().await;
    let path = harness.path("chargers.json");

    let client = RelayClient::new("null")
        .with_host("127.0.0.1")
        .with_port(harness.port);
    client
        .write_json(&path, &json!({"ipAddresses": ["192.168.0.7"]}))
        .await
        .expect("write");

    let value: Value = client.read_json(&path).await.expect("read");
    assert_eq!(value["ipAddresses"][0], "192.168.0.7");

    let err = client.read(&harness.path("missing")).await.unwrap_err();
    assert!(matches!(err, relay_client::ClientError::Relay { status: 404 }));
}
