//! Nullable snapshot store — thread-safe in-memory store for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use hyquery_network::{NetworkError, SnapshotStore};

/// An in-memory key-value + sorted-index store for testing.
///
/// Every failure mode the coordinator must survive can be injected:
/// unreachable at connect, failing publishes, failing reads.
#[derive(Default)]
pub struct NullSnapshotStore {
    snapshots: Mutex<HashMap<String, String>>,
    indexes: Mutex<HashMap<String, HashMap<String, i64>>>,
    ttls: Mutex<HashMap<String, u64>>,
    fail_connect: AtomicBool,
    fail_publish: AtomicBool,
    fail_read: AtomicBool,
    publish_calls: AtomicUsize,
    read_calls: AtomicUsize,
}

impl NullSnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a snapshot and its index entry directly.
    pub fn seed(&self, server_key: &str, index_key: &str, server_id: &str, json: &str, score: i64) {
        self.snapshots
            .lock()
            .insert(server_key.to_string(), json.to_string());
        self.indexes
            .lock()
            .entry(index_key.to_string())
            .or_default()
            .insert(server_id.to_string(), score);
    }

    pub fn snapshot(&self, server_key: &str) -> Option<String> {
        self.snapshots.lock().get(server_key).cloned()
    }

    pub fn ttl(&self, server_key: &str) -> Option<u64> {
        self.ttls.lock().get(server_key).copied()
    }

    pub fn index_contains(&self, index_key: &str, server_id: &str) -> bool {
        self.indexes
            .lock()
            .get(index_key)
            .map(|index| index.contains_key(server_id))
            .unwrap_or(false)
    }

    pub fn fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn fail_publish(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    pub fn fail_read(&self, fail: bool) {
        self.fail_read.store(fail, Ordering::SeqCst);
    }

    pub fn publish_calls(&self) -> usize {
        self.publish_calls.load(Ordering::SeqCst)
    }

    pub fn read_calls(&self) -> usize {
        self.read_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotStore for NullSnapshotStore {
    async fn connect_and_validate(&self) -> Result<(), NetworkError> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(NetworkError::StoreUnavailable(
                "health probe failed".to_string(),
            ));
        }
        Ok(())
    }

    async fn publish_snapshot(
        &self,
        server_key: &str,
        index_key: &str,
        ttl_seconds: u64,
        updated_at_millis: i64,
        server_id: &str,
        snapshot_json: &str,
    ) -> Result<(), NetworkError> {
        self.publish_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(NetworkError::StoreUnavailable("publish refused".to_string()));
        }
        self.snapshots
            .lock()
            .insert(server_key.to_string(), snapshot_json.to_string());
        self.ttls.lock().insert(server_key.to_string(), ttl_seconds);
        self.indexes
            .lock()
            .entry(index_key.to_string())
            .or_default()
            .insert(server_id.to_string(), updated_at_millis);
        Ok(())
    }

    async fn evict_stale_servers(
        &self,
        index_key: &str,
        stale_cutoff_millis: i64,
    ) -> Result<u64, NetworkError> {
        if self.fail_read.load(Ordering::SeqCst) {
            return Err(NetworkError::StoreUnavailable("read refused".to_string()));
        }
        let mut indexes = self.indexes.lock();
        let Some(index) = indexes.get_mut(index_key) else {
            return Ok(0);
        };
        let before = index.len();
        index.retain(|_, score| *score > stale_cutoff_millis);
        Ok((before - index.len()) as u64)
    }

    async fn get_active_server_ids(
        &self,
        index_key: &str,
        stale_cutoff_millis: i64,
    ) -> Result<Vec<String>, NetworkError> {
        if self.fail_read.load(Ordering::SeqCst) {
            return Err(NetworkError::StoreUnavailable("read refused".to_string()));
        }
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        let indexes = self.indexes.lock();
        let mut ids: Vec<String> = indexes
            .get(index_key)
            .map(|index| {
                index
                    .iter()
                    .filter(|(_, score)| **score >= stale_cutoff_millis)
                    .map(|(id, _)| id.clone())
                    .collect()
            })
            .unwrap_or_default();
        ids.sort();
        Ok(ids)
    }

    async fn get_snapshots(
        &self,
        server_keys: &[String],
    ) -> Result<Vec<Option<String>>, NetworkError> {
        if self.fail_read.load(Ordering::SeqCst) {
            return Err(NetworkError::StoreUnavailable("read refused".to_string()));
        }
        let snapshots = self.snapshots.lock();
        Ok(server_keys
            .iter()
            .map(|key| snapshots.get(key).cloned())
            .collect())
    }

    async fn close(&self) {}
}
