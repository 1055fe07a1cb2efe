//! # Per-Source Rate Limiting
//!
//! Token bucket per source node: the burst is the bucket capacity and
//! the sustained rate is the refill. Buckets live in a concurrent map
//! and are created on first sight of a source.

use std::time::Instant;

use dashmap::DashMap;

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

/// Rate limiter keyed by source node id.
pub struct SourceRateLimiter {
    buckets: DashMap<String, TokenBucket>,
    capacity: f64,
    refill_per_sec: f64,
}

impl SourceRateLimiter {
    /// `per_minute` sustained events with a burst of `burst`.
    pub fn new(per_minute: u32, burst: u32) -> Self {
        Self {
            buckets: DashMap::new(),
            capacity: f64::from(burst),
            refill_per_sec: f64::from(per_minute) / 60.0,
        }
    }

    /// Take one token for `source`. Returns `false` when the budget is
    /// exhausted.
    pub fn try_acquire(&self, source: &str) -> bool {
        let mut bucket = self
            .buckets
            .entry(source.to_string())
            .or_insert_with(|| TokenBucket {
                tokens: self.capacity,
                last_refill: Instant::now(),
            });

        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Remaining whole tokens for `source` (full burst if unseen).
    pub fn available(&self, source: &str) -> u32 {
        self.buckets
            .get(source)
            .map(|b| b.tokens as u32)
            .unwrap_or(self.capacity as u32)
    }

    /// Drop buckets idle longer than `idle_secs`.
    pub fn purge_idle(&self, idle_secs: u64) {
        let now = Instant::now();
        self.buckets
            .retain(|_, b| now.duration_since(b.last_refill).as_secs() < idle_secs);
    }
}
