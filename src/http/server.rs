//! HTTP server assembly.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::routing::{get, post};
use axum::Router;
use parking_lot::RwLock;
use tracing::{error, info};

use crate::error::{FloodgateError, Result};
use crate::ratelimit::{RateLimiterBackend, RouteRules};

use super::handlers::{self, AppState};
use super::key::ClientRouteKey;
use super::middleware::RateLimitLayer;

/// HTTP server for the rate limit service.
///
/// The API routes (`/v1/*`) sit behind the crate's own rate limit layer;
/// health and metrics stay open.
pub struct HttpServer<R: RateLimiterBackend + 'static> {
    /// Address to bind to
    addr: SocketAddr,
    /// The counter store
    backend: Arc<R>,
    /// Live route rules
    rules: Arc<RwLock<RouteRules>>,
    /// Whether to honor forwarded-address headers
    trust_forwarded_headers: bool,
    /// Process start, for uptime reporting
    started_at: Instant,
}

impl<R: RateLimiterBackend + 'static> HttpServer<R> {
    /// Create a new server.
    pub fn new(
        addr: SocketAddr,
        backend: Arc<R>,
        rules: Arc<RwLock<RouteRules>>,
        trust_forwarded_headers: bool,
    ) -> Self {
        Self {
            addr,
            backend,
            rules,
            trust_forwarded_headers,
            started_at: Instant::now(),
        }
    }

    /// Assemble the router.
    pub fn router(&self) -> Router {
        let state = AppState {
            backend: Arc::clone(&self.backend),
            rules: Arc::clone(&self.rules),
            started_at: self.started_at,
        };

        let layer = RateLimitLayer::new(
            Arc::clone(&self.backend),
            Arc::clone(&self.rules),
            Arc::new(ClientRouteKey::new(self.trust_forwarded_headers)),
        );

        let api = Router::new()
            .route("/v1/check", post(handlers::check::<R>))
            .route("/v1/status", get(handlers::status::<R>))
            .layer(layer)
            .with_state(state);

        Router::new()
            .merge(api)
            .route("/healthz", get(handlers::health))
            .route("/metrics", get(handlers::metrics_text))
    }

    /// Start the server.
    ///
    /// This method will block until the server is shut down.
    pub async fn serve(self) -> Result<()> {
        let addr = self.addr;
        let app = self.router();

        info!(addr = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .map_err(|e| {
            error!(error = %e, "HTTP server failed");
            FloodgateError::Io(e)
        })
    }

    /// Start the server with graceful shutdown.
    ///
    /// The server drains in-flight requests once the signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let addr = self.addr;
        let app = self.router();

        info!(addr = %addr, "Starting HTTP server with graceful shutdown");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
        .map_err(|e| {
            error!(error = %e, "HTTP server failed");
            FloodgateError::Io(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::{RateLimitPolicy, RateLimiter};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use std::time::Duration;
    use tower::ServiceExt;

    fn server() -> HttpServer<RateLimiter> {
        HttpServer::new(
            "127.0.0.1:0".parse().unwrap(),
            Arc::new(RateLimiter::new()),
            Arc::new(RwLock::new(
                RouteRules::new(RateLimitPolicy::new(100, 60000), vec![]).unwrap(),
            )),
            false,
        )
    }

    #[tokio::test]
    async fn test_healthz_is_open() {
        let app = server().router();
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/healthz")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        // Open endpoints are not behind the limiter
        assert!(!response.headers().contains_key("x-ratelimit-limit"));
    }

    #[tokio::test]
    async fn test_metrics_is_open() {
        let app = server().router();
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_uptime_counts_from_server_creation() {
        let server = server();

        // Router assembly happens later; uptime must not reset with it
        tokio::time::sleep(Duration::from_millis(1100)).await;

        let response = server
            .router()
            .oneshot(
                Request::builder()
                    .uri("/v1/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(json["uptime_secs"].as_u64().unwrap() >= 1);
    }

    #[tokio::test]
    async fn test_api_routes_are_rate_limited() {
        let app = server().router();
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-ratelimit-limit"));
    }
}
