//! Integration tests for `src/web_api.rs`
//!
//! Integration tests spawn a real HTTP server on a unique port and exercise
//! it via `reqwest`. Backends are either absent (heuristic path) or served
//! by `wiremock`.
//!
//! All tests require the `web-api` Cargo feature.

#![cfg(feature = "web-api")]

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method, StatusCode};
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use complexity_broker::config::{BrokerConfig, ServerConfig};
use complexity_broker::web_api::{start_server, AnalysisRequest, RequestError};
use complexity_broker::Orchestrator;

// ============================================================================
// Test Infrastructure
// ============================================================================

/// Atomic counter for unique per-test port allocation.
/// Starts high to avoid collisions with common services.
static PORT_COUNTER: AtomicU16 = AtomicU16::new(29200);

fn next_port() -> u16 {
    PORT_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Spawn a server around `orchestrator` and return its base URL.
async fn spawn_with(orchestrator: Orchestrator, max_request_size: usize) -> String {
    let port = next_port();
    let config = ServerConfig {
        host: "127.0.0.1".to_string(),
        port,
        max_request_size,
        request_deadline_ms: None,
    };
    let orchestrator = Arc::new(orchestrator);
    tokio::spawn(async move {
        let _ = start_server(&config, orchestrator).await;
    });
    // Give the server a moment to bind.
    tokio::time::sleep(Duration::from_millis(300)).await;
    format!("http://127.0.0.1:{port}")
}

/// Spawn a server with no backends configured (heuristic only).
async fn spawn_server() -> String {
    spawn_with(Orchestrator::new(None, None), 1024 * 1024).await
}

fn client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .expect("reqwest client must build in tests")
}

async fn post_json(base: &str, route: &str, body: Value) -> (StatusCode, Value) {
    let resp = client()
        .post(format!("{base}{route}"))
        .json(&body)
        .send()
        .await
        .expect("request must reach the test server");
    let status = resp.status();
    let body = resp.json::<Value>().await.expect("response must be JSON");
    (status, body)
}

// ============================================================================
// Request parsing (public API)
// ============================================================================

#[test]
fn test_analysis_request_parse_is_public() {
    let request = AnalysisRequest::parse(br#"{"code":"print(1)"}"#).expect("valid body");
    assert_eq!(request.code, "print(1)");
    assert_eq!(
        AnalysisRequest::parse(br#"{"code":""}"#),
        Err(RequestError::EmptyCode)
    );
}

// ============================================================================
// POST /api/analyze: heuristic path
// ============================================================================

#[tokio::test]
async fn test_analyze_without_backends_returns_heuristic_envelope() {
    let base = spawn_server().await;
    let (status, body) = post_json(&base, "/api/analyze", json!({"code": "x = 1"})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "result": "Time Complexity: O(1)\nSpace Complexity: O(1)",
            "success": false,
            "source": "fallback",
            "reason": "Missing API key"
        })
    );
}

#[tokio::test]
async fn test_analyze_alias_route_behaves_the_same() {
    let base = spawn_server().await;
    let code = "for (i=0;i<n;i++) { for (j=0;j<n;j++) { } }";
    let (status, body) = post_json(&base, "/analyze", json!({"code": code})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"], "Time Complexity: O(n^2)\nSpace Complexity: O(1)");
}

#[tokio::test]
async fn test_analyze_quick_sort_is_n_log_n() {
    let base = spawn_server().await;
    let code = "function quickSort(arr) { return arr; }";
    let (_, body) = post_json(&base, "/api/analyze", json!({"code": code})).await;
    assert_eq!(
        body["result"],
        "Time Complexity: O(n log n)\nSpace Complexity: O(1)"
    );
}

// ============================================================================
// POST /api/analyze: validation
// ============================================================================

#[tokio::test]
async fn test_missing_code_returns_400() {
    let base = spawn_server().await;
    let (status, body) = post_json(&base, "/api/analyze", json!({"language": "js"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing required field: code");
}

#[tokio::test]
async fn test_non_string_code_returns_400() {
    let base = spawn_server().await;
    let (status, body) = post_json(&base, "/api/analyze", json!({"code": ["a"]})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Field 'code' must be a string");
}

#[tokio::test]
async fn test_blank_code_returns_400() {
    let base = spawn_server().await;
    let (status, body) = post_json(&base, "/api/analyze", json!({"code": "   \n"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Field 'code' must not be empty");
}

#[tokio::test]
async fn test_malformed_json_returns_400() {
    let base = spawn_server().await;
    let resp = client()
        .post(format!("{base}/api/analyze"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .expect("request must reach the test server");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.expect("error body must be JSON");
    assert_eq!(body["error"], "Request body must be valid JSON");
}

#[tokio::test]
async fn test_invalid_bodies_never_reach_a_backend() {
    let gemini = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&gemini)
        .await;

    let mut config = BrokerConfig::default();
    config.primary.api_key = Some("g-key".into());
    config.primary.base_url = Some(gemini.uri());
    let base = spawn_with(Orchestrator::from_config(&config), 1024 * 1024).await;

    for body in [
        r#"{"language":"js"}"#,
        r#"{"code":null}"#,
        r#"{"code":42}"#,
        r#"{"code":"  "}"#,
        "{not json",
    ] {
        let resp = client()
            .post(format!("{base}/api/analyze"))
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await
            .expect("request must reach the test server");
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "body {body:?}");
    }

    let hits = gemini
        .received_requests()
        .await
        .expect("request recording enabled");
    assert!(hits.is_empty(), "backend was contacted {} times", hits.len());
}

#[tokio::test]
async fn test_oversized_body_returns_413() {
    let base = spawn_with(Orchestrator::new(None, None), 64).await;
    let code = "x".repeat(256);
    let resp = client()
        .post(format!("{base}/api/analyze"))
        .json(&json!({"code": code}))
        .send()
        .await
        .expect("request must reach the test server");
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

// ============================================================================
// Method handling and CORS
// ============================================================================

#[tokio::test]
async fn test_get_on_analyze_returns_405_json() {
    let base = spawn_server().await;
    let resp = client()
        .get(format!("{base}/api/analyze"))
        .send()
        .await
        .expect("request must reach the test server");
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    let body: Value = resp.json().await.expect("error body must be JSON");
    assert_eq!(body, json!({"error": "Only POST method is allowed"}));
}

#[tokio::test]
async fn test_put_on_analyze_returns_405() {
    let base = spawn_server().await;
    let resp = client()
        .put(format!("{base}/analyze"))
        .send()
        .await
        .expect("request must reach the test server");
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_options_returns_200_with_cors_headers_and_empty_body() {
    let base = spawn_server().await;
    let resp = client()
        .request(Method::OPTIONS, format!("{base}/api/analyze"))
        .send()
        .await
        .expect("request must reach the test server");

    assert_eq!(resp.status(), StatusCode::OK);
    let headers = resp.headers().clone();
    assert_eq!(
        headers
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
    assert!(headers
        .get("access-control-allow-methods")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("POST")));
    let body = resp.text().await.expect("body must be readable");
    assert!(body.is_empty());
}

#[tokio::test]
async fn test_browser_preflight_is_answered() {
    let base = spawn_server().await;
    let resp = client()
        .request(Method::OPTIONS, format!("{base}/api/analyze"))
        .header("origin", "chrome-extension://abc")
        .header("access-control-request-method", "POST")
        .header("access-control-request-headers", "content-type")
        .send()
        .await
        .expect("request must reach the test server");

    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp
        .headers()
        .get("access-control-allow-origin")
        .is_some());
}

#[tokio::test]
async fn test_post_response_carries_allow_origin() {
    let base = spawn_server().await;
    let resp = client()
        .post(format!("{base}/api/analyze"))
        .header("origin", "https://example.com")
        .json(&json!({"code": "x = 1"}))
        .send()
        .await
        .expect("request must reach the test server");
    assert_eq!(
        resp.headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
}

// ============================================================================
// Request ID
// ============================================================================

#[tokio::test]
async fn test_request_id_is_echoed() {
    let base = spawn_server().await;
    let resp = client()
        .post(format!("{base}/api/analyze"))
        .header("x-request-id", "req-abc-123")
        .json(&json!({"code": "x = 1"}))
        .send()
        .await
        .expect("request must reach the test server");
    assert_eq!(
        resp.headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok()),
        Some("req-abc-123")
    );
}

#[tokio::test]
async fn test_request_id_is_generated_when_absent() {
    let base = spawn_server().await;
    let resp = client()
        .get(format!("{base}/health"))
        .send()
        .await
        .expect("request must reach the test server");
    let id = resp
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert_eq!(id.len(), 36, "expected a UUID, got {id:?}");
}

// ============================================================================
// Health and metrics
// ============================================================================

#[tokio::test]
async fn test_health_reports_backend_configuration() {
    let base = spawn_server().await;
    let resp = client()
        .get(format!("{base}/health"))
        .send()
        .await
        .expect("request must reach the test server");
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.expect("health body must be JSON");
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["primary_configured"], false);
    assert_eq!(body["secondary_configured"], false);
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_metrics_endpoint_returns_text() {
    let _ = complexity_broker::metrics::init_metrics();
    let base = spawn_server().await;
    let _ = post_json(&base, "/api/analyze", json!({"code": "x = 1"})).await;

    let resp = client()
        .get(format!("{base}/metrics"))
        .send()
        .await
        .expect("request must reach the test server");
    assert_eq!(resp.status(), StatusCode::OK);
    let text = resp.text().await.expect("metrics body must be readable");
    assert!(text.contains("broker_requests_total"));
}

// ============================================================================
// Remote backends
// ============================================================================

#[tokio::test]
async fn test_primary_backend_result_is_returned() {
    let gemini = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-1.5-flash:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"content": {"parts": [
                {"text": "**Time Complexity:** O(n)\n**Space Complexity:** O(1)"}
            ]}}]
        })))
        .expect(1)
        .mount(&gemini)
        .await;

    let mut config = BrokerConfig::default();
    config.primary.api_key = Some("g-key".into());
    config.primary.base_url = Some(gemini.uri());

    let base = spawn_with(Orchestrator::from_config(&config), 1024 * 1024).await;
    let (status, body) = post_json(&base, "/api/analyze", json!({"code": "x = 1"})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["source"], "primary");
    assert_eq!(body["success"], true);
    assert!(body.get("reason").is_none());
    assert_eq!(body["result"], "Time Complexity: O(n)\nSpace Complexity: O(1)");
}

#[tokio::test]
async fn test_failing_primary_without_secondary_falls_back() {
    let gemini = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&gemini)
        .await;

    let mut config = BrokerConfig::default();
    config.primary.api_key = Some("g-key".into());
    config.primary.base_url = Some(gemini.uri());

    let base = spawn_with(Orchestrator::from_config(&config), 1024 * 1024).await;
    let (status, body) = post_json(&base, "/api/analyze", json!({"code": "x = 1"})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["source"], "fallback");
    assert_eq!(body["success"], false);
    assert_eq!(
        body["reason"],
        "Primary failed and secondary is not configured"
    );
}
