//! Rate Limiter
//!
//! Token bucket rate limiting per named operation.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Rate limiter configuration for one operation.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitConfig {
    /// Tokens added per second
    pub rate_per_sec: f64,
    /// Maximum burst size (token bucket capacity)
    pub burst_size: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            rate_per_sec: 1.0,
            burst_size: 1,
        }
    }
}

/// Per-operation bucket state.
#[derive(Debug)]
struct Bucket {
    config: RateLimitConfig,
    /// Available tokens, fractional between refills
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(config: RateLimitConfig) -> Self {
        Self {
            tokens: config.burst_size as f64,
            config,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            let capacity = self.config.burst_size as f64;
            self.tokens = (self.tokens + elapsed * self.config.rate_per_sec).min(capacity);
            self.last_refill = now;
        }
    }

    fn retry_after(&self, cost: u64) -> Duration {
        let missing = cost as f64 - self.tokens;
        if self.config.rate_per_sec <= 0.0 || missing <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(missing / self.config.rate_per_sec).unwrap_or(Duration::MAX)
    }
}

/// Result of a rate limit check.
#[derive(Debug, Clone, PartialEq)]
pub enum RateLimitResult {
    /// Request is allowed
    Allowed { remaining: u64 },
    /// Request is rate limited
    Limited { retry_after_ms: u64 },
}

impl RateLimitResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitResult::Allowed { .. })
    }
}

/// Token bucket rate limiter.
///
/// Tracks one bucket per operation name. Buckets are shared by every
/// concurrent caller of the same operation; each bucket is updated under
/// its own lock. A rejected attempt never waits.
pub struct RateLimiter {
    default_config: RateLimitConfig,
    buckets: DashMap<String, Mutex<Bucket>>,
}

impl RateLimiter {
    /// Create a new rate limiter. `default_config` applies to operations
    /// that were never configured explicitly.
    pub fn new(default_config: RateLimitConfig) -> Self {
        Self {
            default_config,
            buckets: DashMap::new(),
        }
    }

    /// Install (or replace) the configuration for an operation, resetting
    /// its bucket to a full burst.
    pub fn configure(&self, operation: &str, config: RateLimitConfig) {
        self.buckets
            .insert(operation.to_string(), Mutex::new(Bucket::new(config)));
    }

    /// Check if a call to this operation is allowed.
    pub fn check(&self, operation: &str) -> RateLimitResult {
        self.check_with_cost(operation, 1)
    }

    /// Check if a call is allowed with a specific cost.
    pub fn check_with_cost(&self, operation: &str, cost: u64) -> RateLimitResult {
        let entry = self
            .buckets
            .entry(operation.to_string())
            .or_insert_with(|| Mutex::new(Bucket::new(self.default_config.clone())));

        let mut bucket = entry.lock();
        bucket.refill(Instant::now());

        if bucket.tokens >= cost as f64 {
            bucket.tokens -= cost as f64;
            RateLimitResult::Allowed {
                remaining: bucket.tokens.floor() as u64,
            }
        } else {
            RateLimitResult::Limited {
                retry_after_ms: u64::try_from(bucket.retry_after(cost).as_millis().max(1))
                    .unwrap_or(u64::MAX),
            }
        }
    }

    /// Get whole tokens remaining for an operation.
    pub fn remaining(&self, operation: &str) -> u64 {
        self.buckets
            .get(operation)
            .map(|b| {
                let mut bucket = b.lock();
                bucket.refill(Instant::now());
                bucket.tokens.floor() as u64
            })
            .unwrap_or(self.default_config.burst_size)
    }

    /// Clear rate limit state for an operation.
    pub fn clear(&self, operation: &str) {
        self.buckets.remove(operation);
    }

    /// Clear all rate limit state.
    pub fn clear_all(&self) {
        self.buckets.clear();
    }

    /// Get the number of tracked operations.
    pub fn operation_count(&self) -> usize {
        self.buckets.len()
    }

    /// Remove buckets that have not been touched for a while.
    pub fn cleanup(&self, max_age: Duration) {
        let now = Instant::now();
        self.buckets
            .retain(|_, bucket| now.saturating_duration_since(bucket.lock().last_refill) < max_age);
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}
