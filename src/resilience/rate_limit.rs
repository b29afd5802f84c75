//! Continuously refilled token bucket.

use std::time::{Duration, Instant};

/// Allows at most `capacity` calls per `interval`, refilled in proportion
/// to elapsed time and capped at the bucket size.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    capacity: f64,
    refill_per_second: f64,
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    /// Full bucket of `max_per_interval` tokens.
    #[must_use]
    pub fn new(max_per_interval: u32, interval: Duration) -> Self {
        Self::new_at(max_per_interval, interval, Instant::now())
    }

    /// Full bucket whose refill clock starts at `now`.
    #[must_use]
    pub fn new_at(max_per_interval: u32, interval: Duration, now: Instant) -> Self {
        let capacity = f64::from(max_per_interval.max(1));
        let seconds = interval.as_secs_f64().max(f64::EPSILON);
        Self {
            capacity,
            refill_per_second: capacity / seconds,
            tokens: capacity,
            last_refill: now,
        }
    }

    /// Take one token if available.
    pub fn try_acquire(&mut self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    /// Take one token at `now` if available.
    pub fn try_acquire_at(&mut self, now: Instant) -> bool {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Tokens available at `now`.
    pub fn available_at(&mut self, now: Instant) -> f64 {
        self.refill(now);
        self.tokens
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_second).min(self.capacity);
        self.last_refill = now;
    }
}
