//! Core rate limiter implementation.

use std::time::SystemTime;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, trace, warn};

use super::backend::RateLimiterBackend;
use super::counter::{Decision, WindowCounter};
use super::rules::RateLimitPolicy;

/// The core rate limiter: per-key window counters over a concurrent map.
///
/// The store is owned by this struct and injected wherever checks happen
/// (middleware, handlers, sweeper), so a distributed implementation can
/// replace it behind [`RateLimiterBackend`] without touching callers.
///
/// Per-key atomicity comes from holding the map's entry guard across the
/// whole read-modify-write step: concurrent checks for one key serialize,
/// so a window never admits more than the policy allows.
pub struct RateLimiter {
    /// Window counters indexed by caller key
    counters: DashMap<String, WindowCounter>,
}

impl RateLimiter {
    /// Create a new rate limiter with an empty store.
    pub fn new() -> Self {
        Self {
            counters: DashMap::new(),
        }
    }

    /// Check the rate limit for `key` under `policy` at the current time.
    pub fn check(&self, key: &str, policy: &RateLimitPolicy) -> Decision {
        self.check_at(key, policy, SystemTime::now())
    }

    /// Check the rate limit for `key` under `policy` at an explicit `now`.
    ///
    /// Tests drive this with a simulated clock; `check` is the wall-clock
    /// entry point.
    pub fn check_at(&self, key: &str, policy: &RateLimitPolicy, now: SystemTime) -> Decision {
        if !policy.is_valid() {
            // Fail closed: a zero limit or window must never disable limiting
            warn!(
                key = %key,
                max_requests = policy.max_requests,
                window_ms = policy.window_ms,
                "Invalid rate limit policy, denying request"
            );
            return Decision {
                allowed: false,
                limit: policy.max_requests,
                remaining: 0,
                reset_at: now + policy.window(),
                retry_after: Some(policy.window()),
            };
        }

        trace!(key = %key, "Checking rate limit");

        let mut entry = self.counters.entry(key.to_string()).or_insert_with(|| {
            debug!(
                key = %key,
                limit = policy.max_requests,
                window_ms = policy.window_ms,
                "Creating new rate limit counter"
            );
            WindowCounter::open_at(now, policy.window())
        });

        let decision = entry.step_at(policy, now);
        if !decision.allowed {
            debug!(key = %key, "Rate limit exceeded");
        }
        decision
    }

    /// Remove every counter whose window has ended, returning how many
    /// were removed.
    ///
    /// Safe to run concurrently with checks: an expired-but-present entry
    /// and an absent one produce the same decision, so sweep order never
    /// changes an outcome.
    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(SystemTime::now())
    }

    /// Sweep with an explicit clock, for tests.
    pub fn sweep_expired_at(&self, now: SystemTime) -> usize {
        let before = self.counters.len();
        self.counters.retain(|_, counter| !counter.is_expired_at(now));
        before.saturating_sub(self.counters.len())
    }

    /// Current admitted count for a key, if a counter exists.
    pub fn count_for(&self, key: &str) -> Option<u64> {
        self.counters.get(key).map(|c| c.count())
    }

    /// Number of tracked keys.
    pub fn entry_count(&self) -> usize {
        self.counters.len()
    }

    /// Drop all counters. Primarily useful for testing.
    pub fn clear(&self) {
        self.counters.clear();
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateLimiterBackend for RateLimiter {
    async fn check(&self, key: &str, policy: &RateLimitPolicy) -> Decision {
        RateLimiter::check(self, key, policy)
    }

    async fn tracked_keys(&self) -> usize {
        self.entry_count()
    }
}
