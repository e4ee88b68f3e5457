//! Token-bucket rate limiting, shared by ingress auth (per client) and
//! per-tool rate budgets. One `TokenBucket` per key; buckets are stored
//! in a process-global `DashMap` so both call sites reuse the
//! identical primitive — tool rate-limit state is per-tool and
//! process-global.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;

/// A single token bucket: `capacity` tokens refilled continuously over
/// `window`, consumed one per request.
struct Bucket {
    tokens: f64,
    capacity: f64,
    refill_per_ms: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(capacity: u32, window: Duration) -> Self {
        let capacity = capacity.max(1) as f64;
        Self {
            tokens: capacity,
            capacity,
            refill_per_ms: capacity / window.as_millis().max(1) as f64,
            last_refill: Instant::now(),
        }
    }

    /// Attempt to consume one token. Returns `Ok(())` if allowed, or
    /// `Err(retry_after)` with the wait until the next token is available.
    fn try_consume(&mut self) -> Result<(), Duration> {
        let now = Instant::now();
        let elapsed_ms = now.duration_since(self.last_refill).as_millis() as f64;
        self.tokens = (self.tokens + elapsed_ms * self.refill_per_ms).min(self.capacity);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let deficit = 1.0 - self.tokens;
            let wait_ms = (deficit / self.refill_per_ms).ceil().max(1.0) as u64;
            Err(Duration::from_millis(wait_ms))
        }
    }
}

/// Keyed token-bucket limiter: one bucket per `String` key (client id,
/// tool name), created lazily on first use with a fixed capacity/window.
pub struct RateLimiter {
    capacity: u32,
    window: Duration,
    buckets: DashMap<String, Mutex<Bucket>>,
}

impl RateLimiter {
    pub fn new(capacity: u32, window: Duration) -> Self {
        Self {
            capacity,
            window,
            buckets: DashMap::new(),
        }
    }

    /// Check and consume one token for `key`. Err carries the
    /// `retry_after` hint surfaced in `ToolError::RateLimited` / the
    /// `429` response body.
    pub fn check(&self, key: &str) -> Result<(), Duration> {
        let bucket = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| Mutex::new(Bucket::new(self.capacity, self.window)));
        bucket.lock().try_consume()
    }

    pub fn tracked_keys(&self) -> usize {
        self.buckets.len()
    }
}
