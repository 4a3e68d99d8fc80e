//! Background sweep of expired counters.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::metrics;

use super::limiter::RateLimiter;

/// Spawn the periodic sweep task.
///
/// Runs independently of request handling and only ever removes entries;
/// an expired entry a sweep hasn't reached yet still behaves as absent on
/// the next check. The returned handle lets the caller abort the task at
/// shutdown.
pub fn spawn_sweeper(limiter: Arc<RateLimiter>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let removed = limiter.sweep_expired();
            if removed > 0 {
                debug!(removed = removed, "Swept expired rate limit entries");
            }
            metrics::SWEPT_KEYS_TOTAL.inc_by(removed as u64);
            metrics::TRACKED_KEYS.set(limiter.entry_count() as i64);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::rules::RateLimitPolicy;

    #[tokio::test]
    async fn test_sweeper_removes_expired_entries() {
        let limiter = Arc::new(RateLimiter::new());
        let policy = RateLimitPolicy::new(5, 20);

        limiter.check("short-lived", &policy);
        assert_eq!(limiter.entry_count(), 1);

        let handle = spawn_sweeper(Arc::clone(&limiter), Duration::from_millis(10));

        // Window is 20ms; give the sweeper a few ticks past expiry
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(limiter.entry_count(), 0);

        handle.abort();
    }

    #[tokio::test]
    async fn test_sweeper_keeps_live_entries() {
        let limiter = Arc::new(RateLimiter::new());
        let policy = RateLimitPolicy::new(5, 60000);

        limiter.check("live", &policy);

        let handle = spawn_sweeper(Arc::clone(&limiter), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(limiter.count_for("live"), Some(1));
        handle.abort();
    }
}
