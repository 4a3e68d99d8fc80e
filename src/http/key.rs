//! Bucket key derivation from incoming requests.

use axum::extract::{ConnectInfo, Request};
use std::net::SocketAddr;

/// Constant bucket used when no client identity can be determined.
///
/// Key derivation must never fail open: a request with no usable address
/// still lands in a shared, rate-limited bucket.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Deterministic derivation of the bucket key from a request.
pub trait KeyExtractor: Send + Sync {
    /// Derive the key. Infallible; implementations fall back to
    /// [`UNKNOWN_CLIENT`] rather than erroring.
    fn key(&self, req: &Request) -> String;
}

/// Default extractor: composes `client:METHOD:path`, e.g.
/// `1.2.3.4:POST:/api/jobs`, isolating limits per endpoint class.
///
/// Forwarded headers are spoofable, so they are only consulted when the
/// service is explicitly configured as sitting behind a trusted proxy.
/// In that mode the leftmost `X-Forwarded-For` entry wins, then
/// `X-Real-Ip`, then the socket peer address. Without trust, only the
/// peer address is used.
#[derive(Debug, Clone)]
pub struct ClientRouteKey {
    trust_forwarded_headers: bool,
}

impl ClientRouteKey {
    /// Create an extractor; `trust_forwarded_headers` opts in to proxy
    /// headers.
    pub fn new(trust_forwarded_headers: bool) -> Self {
        Self {
            trust_forwarded_headers,
        }
    }

    fn client_addr(&self, req: &Request) -> String {
        if self.trust_forwarded_headers {
            // X-Forwarded-For may hold "client, proxy1, proxy2"; the
            // leftmost entry is the original client
            if let Some(forwarded) = req
                .headers()
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
            {
                let first = forwarded.split(',').next().unwrap_or(forwarded).trim();
                if !first.is_empty() {
                    return first.to_string();
                }
            }
            if let Some(real_ip) = req
                .headers()
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
            {
                let real_ip = real_ip.trim();
                if !real_ip.is_empty() {
                    return real_ip.to_string();
                }
            }
        }

        req.extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0.ip().to_string())
            .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
    }
}

impl KeyExtractor for ClientRouteKey {
    fn key(&self, req: &Request) -> String {
        format!(
            "{}:{}:{}",
            self.client_addr(req),
            req.method(),
            req.uri().path()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;

    fn request(method: &str, path: &str, peer: Option<&str>) -> Request {
        let mut req = HttpRequest::builder()
            .method(method)
            .uri(path)
            .body(Body::empty())
            .unwrap();
        if let Some(addr) = peer {
            let addr: SocketAddr = addr.parse().unwrap();
            req.extensions_mut().insert(ConnectInfo(addr));
        }
        req
    }

    #[test]
    fn test_key_composes_client_method_path() {
        let extractor = ClientRouteKey::new(false);
        let req = request("POST", "/api/jobs", Some("1.2.3.4:55000"));
        assert_eq!(extractor.key(&req), "1.2.3.4:POST:/api/jobs");
    }

    #[test]
    fn test_missing_peer_falls_back_to_unknown() {
        let extractor = ClientRouteKey::new(false);
        let req = request("GET", "/api/jobs", None);
        assert_eq!(extractor.key(&req), "unknown:GET:/api/jobs");
    }

    #[test]
    fn test_forwarded_header_ignored_without_trust() {
        let extractor = ClientRouteKey::new(false);
        let mut req = request("GET", "/", Some("10.0.0.1:40000"));
        req.headers_mut()
            .insert("x-forwarded-for", "6.6.6.6".parse().unwrap());
        assert_eq!(extractor.key(&req), "10.0.0.1:GET:/");
    }

    #[test]
    fn test_forwarded_header_leftmost_with_trust() {
        let extractor = ClientRouteKey::new(true);
        let mut req = request("GET", "/", Some("10.0.0.1:40000"));
        req.headers_mut()
            .insert("x-forwarded-for", "1.2.3.4, 10.0.0.1".parse().unwrap());
        assert_eq!(extractor.key(&req), "1.2.3.4:GET:/");
    }

    #[test]
    fn test_real_ip_used_when_no_forwarded_for() {
        let extractor = ClientRouteKey::new(true);
        let mut req = request("GET", "/", Some("10.0.0.1:40000"));
        req.headers_mut()
            .insert("x-real-ip", "5.6.7.8".parse().unwrap());
        assert_eq!(extractor.key(&req), "5.6.7.8:GET:/");
    }

    #[test]
    fn test_trust_falls_back_to_peer_without_headers() {
        let extractor = ClientRouteKey::new(true);
        let req = request("GET", "/", Some("10.0.0.1:40000"));
        assert_eq!(extractor.key(&req), "10.0.0.1:GET:/");
    }
}
