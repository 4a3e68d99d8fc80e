//! Rate limiter trait for abstracting over counter store implementations.

use async_trait::async_trait;

use super::counter::Decision;
use super::rules::RateLimitPolicy;

/// Trait for rate limiter implementations.
///
/// The middleware and decision API are generic over this trait so the
/// in-process [`RateLimiter`](super::RateLimiter) can be swapped for a
/// distributed store without changing the `check` contract.
#[async_trait]
pub trait RateLimiterBackend: Send + Sync {
    /// Check the rate limit for a key under the given policy.
    async fn check(&self, key: &str, policy: &RateLimitPolicy) -> Decision;

    /// Number of keys currently tracked by the store.
    async fn tracked_keys(&self) -> usize;
}
