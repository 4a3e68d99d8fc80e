//! Per-key window counter and the admit/deny decision.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::rules::RateLimitPolicy;

/// The outcome of a rate limit check.
///
/// Denial is a normal result communicated here, never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Whether the request was admitted
    pub allowed: bool,
    /// The limit in force for this key
    pub limit: u64,
    /// Quota left in the current window, never negative
    pub remaining: u64,
    /// When the current window ends
    pub reset_at: SystemTime,
    /// How long until the window resets, populated on deny
    pub retry_after: Option<Duration>,
}

impl Decision {
    /// `Retry-After` in whole seconds, rounded up.
    pub fn retry_after_secs(&self) -> Option<u64> {
        self.retry_after.map(|d| {
            let secs = d.as_secs();
            if d.subsec_nanos() > 0 {
                secs + 1
            } else {
                secs
            }
        })
    }

    /// `reset_at` as epoch seconds for the `X-RateLimit-Reset` header.
    pub fn reset_epoch_secs(&self) -> u64 {
        self.reset_at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// The live counter for one key: requests admitted since `window_start`.
///
/// The window length is captured from the policy in force when the window
/// opened, so per-route windows of different lengths can share the store.
/// An expired counter is replaced wholesale on the next step, never decayed.
#[derive(Debug, Clone)]
pub struct WindowCounter {
    /// Requests admitted in the current window (denied requests don't count)
    count: u64,
    /// When the current window began
    window_start: SystemTime,
    /// Window length captured at open/reset
    window: Duration,
}

impl WindowCounter {
    /// Open an empty counter; the first `step_at` admits and sets count to 1.
    pub fn open_at(now: SystemTime, window: Duration) -> Self {
        Self {
            count: 0,
            window_start: now,
            window,
        }
    }

    /// Whether this counter's window has ended at `now`.
    ///
    /// A clock that moved backwards reads as not expired.
    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        now.duration_since(self.window_start)
            .map(|elapsed| elapsed >= self.window)
            .unwrap_or(false)
    }

    /// Run one admission step against `policy` at time `now`.
    ///
    /// If the window has ended, a fresh one opens (adopting the policy's
    /// window length) and the request is admitted with count 1. Otherwise
    /// the request is admitted and counted while under the limit; at the
    /// limit it is denied without consuming quota.
    pub fn step_at(&mut self, policy: &RateLimitPolicy, now: SystemTime) -> Decision {
        if self.is_expired_at(now) {
            self.count = 0;
            self.window_start = now;
            self.window = policy.window();
        }

        let allowed = self.count < policy.max_requests;
        if allowed {
            self.count += 1;
        }

        let reset_at = self.window_start + self.window;
        let retry_after = if allowed {
            None
        } else {
            Some(
                reset_at
                    .duration_since(now)
                    .unwrap_or(Duration::ZERO),
            )
        };

        Decision {
            allowed,
            limit: policy.max_requests,
            remaining: policy.max_requests.saturating_sub(self.count),
            reset_at,
            retry_after,
        }
    }

    /// Requests admitted in the current window.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// When the current window began.
    pub fn window_start(&self) -> SystemTime {
        self.window_start
    }
}
