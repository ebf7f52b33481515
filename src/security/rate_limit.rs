//! Per-route token bucket rate limiting.
//!
//! Continuous refill: tokens accrue at `refill_per_second` up to `capacity`,
//! so bursts up to `capacity` pass and sustained load is smoothed to the
//! refill rate. A check never blocks; an empty bucket is reported at once.

use std::sync::Mutex;
use tokio::time::Instant;

use crate::config::RateLimitConfig;

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// A token bucket shared by every request on one route.
#[derive(Debug)]
pub struct TokenBucketLimiter {
    capacity: f64,
    refill_per_second: f64,
    state: Mutex<BucketState>,
}

impl TokenBucketLimiter {
    /// Create a full bucket.
    pub fn new(capacity: f64, refill_per_second: f64) -> Self {
        Self {
            capacity,
            refill_per_second,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.capacity, config.refill_per_second)
    }

    /// Take one token if available.
    pub fn allow(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();

        state.tokens = (state.tokens + elapsed * self.refill_per_second).min(self.capacity);
        state.last_refill = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Tokens currently held, without refilling.
    pub fn tokens(&self) -> f64 {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).tokens
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn refill_per_second(&self) -> f64 {
        self.refill_per_second
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_burst_then_reject() {
        let limiter = TokenBucketLimiter::new(20.0, 10.0);
        for i in 0..20 {
            assert!(limiter.allow(), "call {} should pass", i + 1);
        }
        assert!(!limiter.allow(), "21st call should be rejected");
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_after_one_second() {
        let limiter = TokenBucketLimiter::new(20.0, 10.0);
        while limiter.allow() {}

        tokio::time::advance(Duration::from_secs(1)).await;

        let passed = (0..20).filter(|_| limiter.allow()).count();
        assert_eq!(passed, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokens_stay_within_bounds() {
        let limiter = TokenBucketLimiter::new(5.0, 3.0);
        let steps = [0u64, 50, 0, 700, 3000, 0, 0, 10, 250, 10_000, 1];

        for (i, ms) in steps.iter().cycle().take(200).enumerate() {
            tokio::time::advance(Duration::from_millis(*ms)).await;
            for _ in 0..(i % 4) {
                limiter.allow();
                let tokens = limiter.tokens();
                assert!(tokens >= 0.0, "tokens went negative: {}", tokens);
                assert!(tokens <= limiter.capacity(), "tokens exceeded capacity: {}", tokens);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_bucket_caps_at_capacity() {
        let limiter = TokenBucketLimiter::new(3.0, 100.0);
        tokio::time::advance(Duration::from_secs(60)).await;

        assert!(limiter.allow());
        assert!(limiter.allow());
        assert!(limiter.allow());
        assert!(!limiter.allow());
    }
}
