//! HTTP handlers: the decision API plus health, status, and metrics.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::metrics;
use crate::ratelimit::rules::parse_method;
use crate::ratelimit::{RateLimitPolicy, RateLimiterBackend, RouteRules};

/// Shared state handed to the handlers.
pub struct AppState<R> {
    /// The counter store
    pub backend: Arc<R>,
    /// Live route rules, shared with the middleware
    pub rules: Arc<RwLock<RouteRules>>,
    /// Process start, for uptime reporting
    pub started_at: Instant,
}

impl<R> Clone for AppState<R> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            rules: Arc::clone(&self.rules),
            started_at: self.started_at,
        }
    }
}

/// Body of `POST /v1/check`: either a pre-derived `key` or `client` parts,
/// with an optional inline policy override.
#[derive(Debug, Default, Deserialize)]
pub struct CheckRequest {
    /// Pre-derived bucket key
    #[serde(default)]
    pub key: Option<String>,
    /// Client address, composed with method and path when `key` is absent
    #[serde(default)]
    pub client: Option<String>,
    /// HTTP method of the guarded request
    #[serde(default)]
    pub method: Option<String>,
    /// Path of the guarded request
    #[serde(default)]
    pub path: Option<String>,
    /// Override: admitted requests per window
    #[serde(default)]
    pub max_requests: Option<u64>,
    /// Override: window length in milliseconds
    #[serde(default)]
    pub window_ms: Option<u64>,
}

/// Decision returned by `POST /v1/check`.
#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    /// End of the current window, epoch seconds
    pub reset_at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

/// Explicit decision endpoint.
///
/// The policy is resolved from the route rules for `method` + `path` (the
/// default applies when they are absent), then any inline override is
/// layered on top. Zero-valued overrides are rejected rather than passed
/// through to an always-deny check.
#[instrument(skip_all)]
pub async fn check<R: RateLimiterBackend>(
    State(state): State<AppState<R>>,
    Json(req): Json<CheckRequest>,
) -> Response {
    let method = match parse_request_method(&req) {
        Ok(method) => method,
        Err(response) => return response,
    };
    let key = match derive_key(&req, method.as_ref()) {
        Ok(key) => key,
        Err(response) => return response,
    };
    let policy = match resolve_policy(&state, &req, method.as_ref()) {
        Ok(policy) => policy,
        Err(response) => return response,
    };

    metrics::CHECKS_TOTAL.inc();
    let decision = state.backend.check(&key, &policy).await;
    if !decision.allowed {
        metrics::DENIALS_TOTAL.inc();
    }

    debug!(
        key = %key,
        allowed = decision.allowed,
        remaining = decision.remaining,
        "Rate limit decision made"
    );

    Json(CheckResponse {
        allowed: decision.allowed,
        limit: decision.limit,
        remaining: decision.remaining,
        reset_at: decision.reset_epoch_secs(),
        retry_after_secs: decision.retry_after_secs(),
    })
    .into_response()
}

fn parse_request_method(req: &CheckRequest) -> Result<Option<Method>, Response> {
    match req.method.as_deref() {
        // Same validator as rule loading: a key must never name a method
        // the rule table could not match
        Some(method) => match parse_method(method) {
            Ok(method) => Ok(Some(method)),
            Err(e) => {
                warn!(error = %e, "Check request with unknown HTTP method");
                Err(bad_request("unknown HTTP method"))
            }
        },
        None => Ok(None),
    }
}

fn derive_key(req: &CheckRequest, method: Option<&Method>) -> Result<String, Response> {
    if let Some(key) = &req.key {
        if !key.is_empty() {
            return Ok(key.clone());
        }
    }
    match &req.client {
        Some(client) if !client.is_empty() => {
            let method = method.map(Method::as_str).unwrap_or("GET");
            let path = req.path.as_deref().unwrap_or("/");
            Ok(format!("{}:{}:{}", client, method, path))
        }
        _ => {
            warn!("Check request without key or client");
            Err(bad_request("key or client is required"))
        }
    }
}

fn resolve_policy<R>(
    state: &AppState<R>,
    req: &CheckRequest,
    method: Option<&Method>,
) -> Result<RateLimitPolicy, Response> {
    if req.max_requests == Some(0) || req.window_ms == Some(0) {
        warn!("Check request with zero-valued policy override");
        return Err(bad_request(
            "max_requests and window_ms must be greater than zero",
        ));
    }

    let base = match (method, &req.path) {
        (Some(method), Some(path)) => state.rules.read().resolve(method, path),
        _ => state.rules.read().default_policy(),
    };

    Ok(RateLimitPolicy::new(
        req.max_requests.unwrap_or(base.max_requests),
        req.window_ms.unwrap_or(base.window_ms),
    ))
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({
            "error": "invalid_request",
            "message": message,
        })),
    )
        .into_response()
}

/// Body of `GET /v1/status`.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub version: &'static str,
    pub uptime_secs: u64,
    pub tracked_keys: usize,
    pub rule_count: usize,
}

/// Service status: uptime, tracked keys, configured rules.
pub async fn status<R: RateLimiterBackend>(
    State(state): State<AppState<R>>,
) -> Json<StatusResponse> {
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started_at.elapsed().as_secs(),
        tracked_keys: state.backend.tracked_keys().await,
        rule_count: state.rules.read().len(),
    })
}

/// Liveness probe.
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Prometheus text exposition.
pub async fn metrics_text() -> impl IntoResponse {
    metrics::render()
}
