//! Per-client rate limiting.
//!
//! Token bucket per client IP: capacity `SECURITY_MAX_REQUESTS_PER_MIN`
//! tokens, refilled over a 60 second window. The table is sharded by key
//! hash (DashMap), so two clients never contend on one lock.

use std::net::IpAddr;
use std::time::Instant;

use dashmap::DashMap;

/// A simple token bucket rate limiter.
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_update: Instant::now(),
        }
    }

    fn try_acquire(&mut self, capacity: f64, refill_rate: f64) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();

        // Refill tokens
        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Process-wide limiter state.
pub struct RateLimiter {
    buckets: DashMap<IpAddr, TokenBucket>,
    capacity: f64,
    refill_rate: f64,
}

impl RateLimiter {
    /// `max_per_min` requests allowed per client per 60 s window.
    pub fn new(max_per_min: u32) -> Self {
        Self {
            buckets: DashMap::new(),
            capacity: max_per_min as f64,
            refill_rate: max_per_min as f64 / 60.0,
        }
    }

    /// Take one token for this client; false means rate limited.
    pub fn check(&self, client: IpAddr) -> bool {
        let mut bucket = self
            .buckets
            .entry(client)
            .or_insert_with(|| TokenBucket::new(self.capacity));
        bucket.try_acquire(self.capacity, self.refill_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(last: u8) -> IpAddr {
        IpAddr::from([127, 0, 0, last])
    }

    #[test]
    fn allows_up_to_capacity_then_limits() {
        let limiter = RateLimiter::new(60);
        let client = ip(1);
        let allowed = (0..100).filter(|_| limiter.check(client)).count();
        // Burst capacity is the per-minute cap; refill over a 100-probe
        // loop is negligible.
        assert!(allowed >= 60);
        assert!(allowed <= 62);
        assert!(!limiter.check(client));
    }

    #[test]
    fn clients_have_independent_buckets() {
        let limiter = RateLimiter::new(1);
        assert!(limiter.check(ip(1)));
        assert!(!limiter.check(ip(1)));
        assert!(limiter.check(ip(2)));
    }
}
