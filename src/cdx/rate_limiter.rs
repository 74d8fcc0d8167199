//! Token-bucket limiter for CDX requests.
//!
//! The CDX index is fetched sequentially (variant by variant, page by page),
//! so the bucket needs no atomics: callers hold it mutably and await until a
//! token is available.

use std::time::Duration;
use tokio::time::Instant;

/// Burst capacity: up to this many requests may be issued back-to-back
/// before the per-minute budget starts gating.
const BURST: f64 = 5.0;

/// Token bucket admitting `rate_per_min` requests per minute.
#[derive(Debug)]
pub struct CdxRateLimiter {
    tokens: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl CdxRateLimiter {
    #[must_use]
    pub fn new(rate_per_min: u32) -> Self {
        Self {
            tokens: BURST,
            refill_per_sec: f64::from(rate_per_min.max(1)) / 60.0,
            last_refill: Instant::now(),
        }
    }

    /// Wait until a token is available, then consume it.
    pub async fn acquire(&mut self) {
        self.refill();
        if self.tokens < 1.0 {
            let deficit = 1.0 - self.tokens;
            let wait = Duration::from_secs_f64(deficit / self.refill_per_sec);
            tokio::time::sleep(wait).await;
            self.refill();
        }
        self.tokens = (self.tokens - 1.0).max(0.0);
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(BURST);
        self.last_refill = now;
    }
}
