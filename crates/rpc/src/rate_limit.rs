//! Per-caller token-bucket rate limiting, one bucket per endpoint class.
//! Buckets are keyed by the caller's `tenant_id`/`miner_id`/`caller_id` so
//! one noisy caller cannot exhaust another's budget.

use std::collections::HashMap;

use coordinator_config::RateLimit;
use parking_lot::Mutex;

#[derive(Debug, Clone, Copy)]
struct Bucket {
    tokens: f64,
    last_refill_ms: u64,
}

/// One token bucket per key, sharing a single refill policy.
#[derive(Debug)]
pub struct RateLimiter {
    policy: RateLimit,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(policy: RateLimit) -> Self {
        Self { policy, buckets: Mutex::new(HashMap::new()) }
    }

    /// Attempts to spend one token for `key` at `now_ms`. Returns `true` if
    /// the call is admitted.
    pub fn try_acquire(&self, key: &str, now_ms: u64) -> bool {
        let mut buckets = self.buckets.lock();
        let bucket = buckets.entry(key.to_owned()).or_insert(Bucket { tokens: f64::from(self.policy.tokens), last_refill_ms: now_ms });

        let elapsed_ms = now_ms.saturating_sub(bucket.last_refill_ms);
        bucket.tokens = (bucket.tokens + (elapsed_ms as f64 / 1000.0) * self.policy.refill_per_sec).min(f64::from(self.policy.tokens));
        bucket.last_refill_ms = now_ms;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}
