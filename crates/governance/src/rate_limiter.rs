//! Per-(tenant, action) token bucket.

use dashmap::DashMap;
use std::time::Instant;

use operative_core::config::RateLimiterConfig;
use operative_core::types::StateKey;

/// Bucket state for one key.
#[derive(Debug, Clone)]
struct RateBucket {
    /// Always within `[0, bucket_size]`.
    tokens: f64,
    last_update: Instant,
}

/// Answer to `allow()`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateDecision {
    pub granted: bool,
    /// Seconds until `cost` tokens will be available; 0 when granted.
    pub wait_seconds: f64,
}

/// Token bucket limiter keyed by `(tenant_id, action)`.
///
/// Refill is computed on demand from elapsed time, so there is no background
/// task. Keys are allocated lazily and never evicted.
pub struct RateLimiter {
    buckets: DashMap<StateKey, RateBucket>,
    rate: f64,
    bucket_size: f64,
}

impl RateLimiter {
    pub fn new(config: &RateLimiterConfig) -> Self {
        Self {
            buckets: DashMap::new(),
            rate: config.rate_per_second,
            bucket_size: config.bucket_size,
        }
    }

    /// Try to take one token.
    pub fn allow(&self, tenant_id: &str, action: &str) -> RateDecision {
        self.allow_cost(tenant_id, action, 1.0)
    }

    /// Try to take `cost` tokens.
    pub fn allow_cost(&self, tenant_id: &str, action: &str, cost: f64) -> RateDecision {
        let now = Instant::now();
        let mut bucket = self
            .buckets
            .entry(StateKey::new(tenant_id, action))
            .or_insert_with(|| RateBucket {
                tokens: self.bucket_size,
                last_update: now,
            });

        let elapsed = now.saturating_duration_since(bucket.last_update).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate).min(self.bucket_size);
        bucket.last_update = now;

        if bucket.tokens >= cost {
            bucket.tokens = (bucket.tokens - cost).max(0.0);
            tracing::debug!(
                tenant_id = tenant_id,
                action = action,
                remaining = bucket.tokens,
                "Rate token granted"
            );
            RateDecision {
                granted: true,
                wait_seconds: 0.0,
            }
        } else {
            let wait_seconds = (cost - bucket.tokens) / self.rate;
            tracing::debug!(
                tenant_id = tenant_id,
                action = action,
                wait_seconds = wait_seconds,
                "Rate limit hit"
            );
            RateDecision {
                granted: false,
                wait_seconds,
            }
        }
    }

    /// Tokens currently available for a key, refilled to now.
    pub fn tokens(&self, tenant_id: &str, action: &str) -> f64 {
        self.buckets
            .get(&StateKey::new(tenant_id, action))
            .map(|b| {
                let elapsed = b.last_update.elapsed().as_secs_f64();
                (b.tokens + elapsed * self.rate).min(self.bucket_size)
            })
            .unwrap_or(self.bucket_size)
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.buckets.len()
    }
}
