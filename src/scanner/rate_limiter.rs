//! Interval gate for outbound pricing calls.
//!
//! The SP-API quota is per credential, so every call made with a credential
//! goes through the same [`RateLimiter`], whichever scan issued it. The
//! [`RateLimiterRegistry`] hands out that shared instance.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

/// Enforces a minimum spacing between calls and tracks consecutive throttling.
pub struct RateLimiter {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
    consecutive_rate_limits: AtomicU32,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(None),
            consecutive_rate_limits: AtomicU32::new(0),
        }
    }

    /// Suspend until at least `min_interval` has passed since the previous slot.
    ///
    /// The gate is held while waiting, so concurrent callers are released one
    /// at a time in lock order.
    pub async fn wait_for_next_slot(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                tracing::trace!(wait_ms = wait.as_millis() as u64, "Waiting for rate limit slot");
                sleep(wait).await;
            }
        }
        *last = Some(Instant::now());
    }

    pub fn on_success(&self) {
        self.consecutive_rate_limits.store(0, Ordering::SeqCst);
    }

    /// Record a throttling response. Returns the new consecutive count.
    pub fn on_rate_limited(&self) -> u32 {
        self.consecutive_rate_limits.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn consecutive_rate_limit_count(&self) -> u32 {
        self.consecutive_rate_limits.load(Ordering::SeqCst)
    }

    /// Clear the streak once an extended cooldown has been served.
    pub fn on_cooldown_complete(&self) {
        self.consecutive_rate_limits.store(0, Ordering::SeqCst);
    }
}

/// Process-wide limiters keyed by credential.
pub struct RateLimiterRegistry {
    min_interval: Duration,
    limiters: StdMutex<HashMap<String, Arc<RateLimiter>>>,
}

impl RateLimiterRegistry {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            limiters: StdMutex::new(HashMap::new()),
        }
    }

    /// Shared limiter for `credential_id`, created on first use.
    pub fn limiter_for(&self, credential_id: &str) -> Arc<RateLimiter> {
        let mut limiters = self
            .limiters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(
            limiters
                .entry(credential_id.to_string())
                .or_insert_with(|| Arc::new(RateLimiter::new(self.min_interval))),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn consecutive_slots_respect_min_interval() {
        let limiter = RateLimiter::new(Duration::from_millis(500));
        let mut stamps = Vec::new();
        for _ in 0..5 {
            limiter.wait_for_next_slot().await;
            stamps.push(Instant::now());
        }
        for pair in stamps.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(500));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_slot_is_immediate() {
        let limiter = RateLimiter::new(Duration::from_secs(2));
        let start = Instant::now();
        limiter.wait_for_next_slot().await;
        assert_eq!(Instant::now() - start, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn no_wait_after_interval_has_passed() {
        let limiter = RateLimiter::new(Duration::from_millis(100));
        limiter.wait_for_next_slot().await;
        sleep(Duration::from_millis(250)).await;
        let before = Instant::now();
        limiter.wait_for_next_slot().await;
        assert_eq!(Instant::now() - before, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_are_spaced() {
        let limiter = Arc::new(RateLimiter::new(Duration::from_millis(300)));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                limiter.wait_for_next_slot().await;
                Instant::now()
            }));
        }
        let mut stamps = Vec::new();
        for handle in handles {
            stamps.push(handle.await.unwrap());
        }
        stamps.sort();
        for pair in stamps.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(300));
        }
    }

    #[test]
    fn success_resets_streak() {
        let limiter = RateLimiter::new(Duration::from_millis(10));
        assert_eq!(limiter.on_rate_limited(), 1);
        assert_eq!(limiter.on_rate_limited(), 2);
        assert_eq!(limiter.consecutive_rate_limit_count(), 2);
        limiter.on_success();
        assert_eq!(limiter.consecutive_rate_limit_count(), 0);
    }

    #[test]
    fn registry_shares_limiter_per_credential() {
        let registry = RateLimiterRegistry::new(Duration::from_millis(10));
        let a = registry.limiter_for("seller-a");
        let again = registry.limiter_for("seller-a");
        let b = registry.limiter_for("seller-b");
        assert!(Arc::ptr_eq(&a, &again));
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
