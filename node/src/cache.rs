//! Response cache with bounded staleness.
//!
//! Two slots (basic, full) each hold a serialized response and its creation
//! time. Reads are lock-free in the common case; an expired slot is rebuilt
//! under a per-slot async mutex with a re-check, so at most one rebuild is
//! in flight per slot and readers never observe a torn buffer.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::Mutex;

use hyquery_network::CacheInvalidate;

/// Which response slot to read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseKind {
    Basic,
    Full,
}

struct CachedResponse {
    data: Arc<[u8]>,
    created_at: Instant,
}

struct Slot {
    value: RwLock<Option<CachedResponse>>,
    rebuild: Mutex<()>,
}

impl Slot {
    fn new() -> Self {
        Self {
            value: RwLock::new(None),
            rebuild: Mutex::new(()),
        }
    }

    fn fresh_value(&self, ttl: Duration) -> Option<Arc<[u8]>> {
        let guard = self.value.read();
        guard
            .as_ref()
            .filter(|cached| cached.created_at.elapsed() <= ttl)
            .map(|cached| cached.data.clone())
    }
}

/// TTL-bounded cache of serialized query responses.
pub struct ResponseCache {
    ttl: Duration,
    basic: Slot,
    full: Slot,
}

impl ResponseCache {
    pub fn new(ttl_seconds: u32) -> Self {
        Self {
            ttl: Duration::from_secs(ttl_seconds as u64),
            basic: Slot::new(),
            full: Slot::new(),
        }
    }

    /// Return the cached response for `kind`, rebuilding via `build` when
    /// the slot is empty or older than the TTL. The returned bytes are
    /// immutable; callers copy them into their own write buffer.
    pub async fn get_or_build<F, Fut, E>(
        &self,
        kind: ResponseKind,
        build: F,
    ) -> Result<Arc<[u8]>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<u8>, E>>,
    {
        let slot = self.slot(kind);

        if let Some(data) = slot.fresh_value(self.ttl) {
            return Ok(data);
        }

        let _rebuild = slot.rebuild.lock().await;
        // Another rebuild may have completed while we waited.
        if let Some(data) = slot.fresh_value(self.ttl) {
            return Ok(data);
        }

        let data: Arc<[u8]> = build().await?.into();
        *slot.value.write() = Some(CachedResponse {
            data: data.clone(),
            created_at: Instant::now(),
        });
        Ok(data)
    }

    /// Drop both slots; the next reads rebuild.
    pub fn invalidate(&self) {
        *self.basic.value.write() = None;
        *self.full.value.write() = None;
    }

    fn slot(&self, kind: ResponseKind) -> &Slot {
        match kind {
            ResponseKind::Basic => &self.basic,
            ResponseKind::Full => &self.full,
        }
    }
}

impl CacheInvalidate for ResponseCache {
    fn invalidate(&self) {
        ResponseCache::invalidate(self);
    }
}
