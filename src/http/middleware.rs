//! Rate limiting tower middleware.
//!
//! Wraps a service with the admit/deny check: resolves the route's policy,
//! derives the bucket key, and either short-circuits with 429 or forwards
//! the request and attaches quota headers to the response.

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::extract::Request;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use parking_lot::RwLock;
use tower::{Layer, Service};
use tracing::debug;

use crate::metrics;
use crate::ratelimit::{Decision, RateLimiterBackend, RouteRules};

use super::key::KeyExtractor;

const HEADER_LIMIT: &str = "x-ratelimit-limit";
const HEADER_REMAINING: &str = "x-ratelimit-remaining";
const HEADER_RESET: &str = "x-ratelimit-reset";

/// Tower layer applying per-key rate limiting to the wrapped service.
pub struct RateLimitLayer<R> {
    backend: Arc<R>,
    rules: Arc<RwLock<RouteRules>>,
    extractor: Arc<dyn KeyExtractor>,
}

impl<R> RateLimitLayer<R> {
    /// Create a layer over a counter store, rule set, and key extractor.
    pub fn new(
        backend: Arc<R>,
        rules: Arc<RwLock<RouteRules>>,
        extractor: Arc<dyn KeyExtractor>,
    ) -> Self {
        Self {
            backend,
            rules,
            extractor,
        }
    }

    /// Swap the live rule set. Services already layered share the lock and
    /// pick up the new rules on their next request.
    pub fn set_rules(&self, rules: RouteRules) {
        *self.rules.write() = rules;
    }
}

impl<R> Clone for RateLimitLayer<R> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            rules: Arc::clone(&self.rules),
            extractor: Arc::clone(&self.extractor),
        }
    }
}

impl<S, R> Layer<S> for RateLimitLayer<R> {
    type Service = RateLimitService<S, R>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            backend: Arc::clone(&self.backend),
            rules: Arc::clone(&self.rules),
            extractor: Arc::clone(&self.extractor),
        }
    }
}

/// The layered service performing the check per request.
pub struct RateLimitService<S, R> {
    inner: S,
    backend: Arc<R>,
    rules: Arc<RwLock<RouteRules>>,
    extractor: Arc<dyn KeyExtractor>,
}

impl<S: Clone, R> Clone for RateLimitService<S, R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            backend: Arc::clone(&self.backend),
            rules: Arc::clone(&self.rules),
            extractor: Arc::clone(&self.extractor),
        }
    }
}

impl<S, R> Service<Request> for RateLimitService<S, R>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
    R: RateLimiterBackend + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let policy = self.rules.read().resolve(req.method(), req.uri().path());
        let key = self.extractor.key(&req);
        let backend = Arc::clone(&self.backend);
        let mut inner = self.inner.clone();

        Box::pin(async move {
            metrics::CHECKS_TOTAL.inc();
            let decision = backend.check(&key, &policy).await;

            if !decision.allowed {
                metrics::DENIALS_TOTAL.inc();
                debug!(key = %key, "Request denied by rate limit");
                return Ok(deny_response(&decision));
            }

            let mut response = inner.call(req).await?;
            attach_quota_headers(response.headers_mut(), &decision);
            Ok(response)
        })
    }
}

/// Attach `X-RateLimit-Limit` / `-Remaining` / `-Reset` to a response.
fn attach_quota_headers(headers: &mut HeaderMap, decision: &Decision) {
    headers.insert(
        HeaderName::from_static(HEADER_LIMIT),
        HeaderValue::from(decision.limit),
    );
    headers.insert(
        HeaderName::from_static(HEADER_REMAINING),
        HeaderValue::from(decision.remaining),
    );
    headers.insert(
        HeaderName::from_static(HEADER_RESET),
        HeaderValue::from(decision.reset_epoch_secs()),
    );
}

/// Build the 429 short-circuit response.
fn deny_response(decision: &Decision) -> Response {
    let retry_after = decision.retry_after_secs().unwrap_or(0);
    let reset_at: DateTime<Utc> = decision.reset_at.into();

    let body = Json(serde_json::json!({
        "error": "rate_limit_exceeded",
        "message": format!("Rate limit exceeded. Try again in {} seconds", retry_after),
        "retry_after_secs": retry_after,
        "reset_at": reset_at.to_rfc3339(),
    }));

    let mut response = (StatusCode::TOO_MANY_REQUESTS, body).into_response();
    attach_quota_headers(response.headers_mut(), decision);
    response
        .headers_mut()
        .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
    response
}
