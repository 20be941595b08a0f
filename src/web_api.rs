//! Web API Server
//!
//! Exposes the fallback chain over HTTP.
//!
//! ## Endpoints
//!
//! - `POST /api/analyze`: Analyze a code snippet (also mounted at `/analyze`)
//! - `OPTIONS /api/analyze`: CORS preflight
//! - `GET  /health`: Health check
//! - `GET  /metrics`: Prometheus metrics
//!
//! Any other method on the analyze routes gets 405 with a JSON error body.

use axum::{
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderValue, Method, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::orchestrator::{AnalysisResult, Orchestrator};
use crate::{metrics, BrokerError};

// ============================================================================
// Types
// ============================================================================

/// Validated JSON body for `POST /api/analyze`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnalysisRequest {
    /// Source code to analyze. Never blank.
    pub code: String,
}

/// Reasons an inbound body is rejected with 400.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    /// The body is not a JSON document.
    #[error("Request body must be valid JSON")]
    InvalidJson,
    /// The `code` field is absent or null.
    #[error("Missing required field: code")]
    MissingCode,
    /// The `code` field is present but not a string.
    #[error("Field 'code' must be a string")]
    CodeNotString,
    /// The `code` field is empty or whitespace only.
    #[error("Field 'code' must not be empty")]
    EmptyCode,
}

impl AnalysisRequest {
    /// Parse and validate a raw request body.
    ///
    /// # Errors
    ///
    /// Returns the first [`RequestError`] the body violates.
    pub fn parse(body: &[u8]) -> Result<Self, RequestError> {
        let value: Value = serde_json::from_slice(body).map_err(|_| RequestError::InvalidJson)?;

        let code = match value.get("code") {
            None | Some(Value::Null) => return Err(RequestError::MissingCode),
            Some(Value::String(code)) => code,
            Some(_) => return Err(RequestError::CodeNotString),
        };

        if code.trim().is_empty() {
            return Err(RequestError::EmptyCode);
        }

        Ok(Self { code: code.clone() })
    }
}

// ============================================================================
// Server
// ============================================================================

/// Build the application router around a shared orchestrator.
///
/// Split out from [`start_server`] so the routes can be served from any
/// listener.
pub fn build_router(orchestrator: Arc<Orchestrator>, max_request_size: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    let analyze = post(analyze_handler)
        .options(preflight_handler)
        .fallback(method_not_allowed);

    Router::new()
        .route("/api/analyze", analyze.clone())
        .route("/analyze", analyze)
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(middleware::from_fn_with_state(
            max_request_size,
            body_size_middleware,
        ))
        .layer(DefaultBodyLimit::max(max_request_size))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(orchestrator)
}

/// Start the web API server.
///
/// Binds to `config.host:config.port` and serves until Ctrl-C.
///
/// # Errors
///
/// Returns [`BrokerError::Server`] if the address cannot be bound or the
/// server fails.
pub async fn start_server(
    config: &ServerConfig,
    orchestrator: Arc<Orchestrator>,
) -> Result<(), BrokerError> {
    let addr = format!("{}:{}", config.host, config.port);

    info!(
        primary_configured = orchestrator.primary_configured(),
        secondary_configured = orchestrator.secondary_configured(),
        "Starting web API server on http://{}",
        addr
    );

    let app = build_router(orchestrator, config.max_request_size);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| BrokerError::Server(format!("failed to bind {addr}: {e}")))?;

    info!("Web API ready on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| BrokerError::Server(e.to_string()))?;

    info!("Web API shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

// ============================================================================
// Middleware
// ============================================================================

/// Adds a unique `X-Request-ID` header to every response.
///
/// If the client sends an `X-Request-ID` header, it is preserved; otherwise
/// a new UUID v4 is generated. Everything logged while handling the request
/// carries the id.
async fn request_id_middleware(req: Request<Body>, next: Next) -> Response {
    let request_id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let span = info_span!("request", request_id = %request_id);
    let mut response = next.run(req).instrument(span).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }

    response
}

/// Rejects requests whose `Content-Length` exceeds `max_size` with 413.
async fn body_size_middleware(
    State(max_size): State<usize>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if let Some(content_length) = req
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<usize>().ok())
    {
        if content_length > max_size {
            metrics::inc_validation_rejection();
            return (
                StatusCode::PAYLOAD_TOO_LARGE,
                Json(serde_json::json!({"error": "Request body too large"})),
            )
                .into_response();
        }
    }

    next.run(req).await
}

// ============================================================================
// Handlers
// ============================================================================

/// `POST /api/analyze`: Run the fallback chain for one snippet.
///
/// The body is read as raw bytes so every malformed shape maps to a 400
/// with a specific message.
async fn analyze_handler(
    State(orchestrator): State<Arc<Orchestrator>>,
    body: Bytes,
) -> Result<Json<AnalysisResult>, AppError> {
    let request = AnalysisRequest::parse(&body).map_err(|e| {
        metrics::inc_validation_rejection();
        warn!(error = %e, "rejected analysis request");
        AppError::BadRequest(e)
    })?;

    let result = orchestrator.resolve_isolated(request.code).await;

    info!(
        source = %result.source,
        success = result.success,
        "analysis complete"
    );

    Ok(Json(result))
}

/// `OPTIONS /api/analyze`: Preflight with an empty body.
async fn preflight_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (header::ACCESS_CONTROL_ALLOW_METHODS, "POST, OPTIONS"),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type"),
        ],
    )
}

async fn method_not_allowed() -> AppError {
    AppError::MethodNotAllowed
}

/// `GET /health`: Health check endpoint.
async fn health_handler(State(orchestrator): State<Arc<Orchestrator>>) -> Json<Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "primary_configured": orchestrator.primary_configured(),
        "secondary_configured": orchestrator.secondary_configured(),
    }))
}

/// `GET /metrics`: Prometheus metrics endpoint.
async fn metrics_handler() -> String {
    metrics::gather_metrics()
}

// ============================================================================
// Error Type
// ============================================================================

/// Application-level errors returned by API handlers.
///
/// Each variant maps to an HTTP status code and a JSON error body.
#[derive(Debug)]
enum AppError {
    /// The body failed validation.
    BadRequest(RequestError),
    /// The route exists but not for this method.
    MethodNotAllowed,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            AppError::MethodNotAllowed => (
                StatusCode::METHOD_NOT_ALLOWED,
                "Only POST method is allowed".to_string(),
            ),
        };

        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

// ============================================================================
// Tests
// ============================================================================
