//! Per-source rate limiting using the token bucket algorithm.
//!
//! Each source IP gets its own bucket that refills at the configured rate.
//! Buckets untouched for longer than the cleanup interval are swept so that
//! scanning or flood traffic cannot grow the map without bound.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};

/// Buckets idle longer than this are evicted; the sweep itself also runs at
/// this interval.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Per-IP token bucket rate limiter.
///
/// Safe for concurrent use from multiple dispatch threads: the map takes a
/// short read lock on the hot path, and each bucket serializes its own
/// mutations.
pub struct QueryRateLimiter {
    buckets: RwLock<HashMap<IpAddr, Arc<Mutex<TokenBucket>>>>,
    max_tokens: u32,
    refill_per_second: u32,
    last_cleanup: Mutex<Instant>,
}

impl QueryRateLimiter {
    /// Create a limiter allowing `refill_per_second` sustained requests with
    /// bursts up to `max_tokens`.
    pub fn new(max_tokens: u32, refill_per_second: u32) -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
            max_tokens,
            refill_per_second,
            last_cleanup: Mutex::new(Instant::now()),
        }
    }

    /// Try to consume one token for the given source address.
    ///
    /// Returns `true` if the request is allowed.
    pub fn try_acquire(&self, addr: IpAddr) -> bool {
        self.cleanup_if_needed();

        if let Some(bucket) = self.buckets.read().get(&addr) {
            return bucket.lock().try_consume();
        }

        let bucket = self
            .buckets
            .write()
            .entry(addr)
            .or_insert_with(|| {
                Arc::new(Mutex::new(TokenBucket::new(
                    self.max_tokens,
                    self.refill_per_second,
                )))
            })
            .clone();
        let allowed = bucket.lock().try_consume();
        allowed
    }

    /// Number of tracked source addresses.
    pub fn tracked_sources(&self) -> usize {
        self.buckets.read().len()
    }

    fn cleanup_if_needed(&self) {
        let now = Instant::now();
        {
            let mut last = self.last_cleanup.lock();
            if now.duration_since(*last) < CLEANUP_INTERVAL {
                return;
            }
            *last = now;
        }

        self.buckets
            .write()
            .retain(|_, bucket| !bucket.lock().is_idle_since(now, CLEANUP_INTERVAL));
    }
}

/// Token bucket for a single source address.
struct TokenBucket {
    max_tokens: f64,
    refill_per_nano: f64,
    tokens: f64,
    last_refill: Instant,
    last_access: Instant,
}

impl TokenBucket {
    fn new(max_tokens: u32, refill_per_second: u32) -> Self {
        let now = Instant::now();
        Self {
            max_tokens: max_tokens as f64,
            refill_per_nano: refill_per_second as f64 / 1e9,
            tokens: max_tokens as f64,
            last_refill: now,
            last_access: now,
        }
    }

    fn try_consume(&mut self) -> bool {
        self.refill();
        self.last_access = Instant::now();

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed_nanos = now.duration_since(self.last_refill).as_nanos() as f64;
        self.tokens = (self.tokens + elapsed_nanos * self.refill_per_nano).min(self.max_tokens);
        self.last_refill = now;
    }

    fn is_idle_since(&self, now: Instant, idle: Duration) -> bool {
        now.duration_since(self.last_access) > idle
    }
}
