//! Narrow interface onto the shared snapshot store.
//!
//! The store coordinator only ever needs these six operations, so the
//! driver stays behind this trait and never leaks its own types into the
//! coordinator. Any key-value store with a sorted index can implement it.

use async_trait::async_trait;

use crate::error::NetworkError;

/// Client for the shared store backing the `redis` coordinator.
///
/// `publish_snapshot` must atomically set the keyed snapshot (with TTL) and
/// upsert the server id into the sorted index scored by `updated_at_millis`.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Succeed only if the store answers a health probe.
    async fn connect_and_validate(&self) -> Result<(), NetworkError>;

    async fn publish_snapshot(
        &self,
        server_key: &str,
        index_key: &str,
        ttl_seconds: u64,
        updated_at_millis: i64,
        server_id: &str,
        snapshot_json: &str,
    ) -> Result<(), NetworkError>;

    /// Remove index entries with score at or below the cutoff; returns how
    /// many were removed.
    async fn evict_stale_servers(
        &self,
        index_key: &str,
        stale_cutoff_millis: i64,
    ) -> Result<u64, NetworkError>;

    /// Index entries with score at or above the cutoff.
    async fn get_active_server_ids(
        &self,
        index_key: &str,
        stale_cutoff_millis: i64,
    ) -> Result<Vec<String>, NetworkError>;

    /// Batched multi-get; a missing key yields `None` at its position.
    async fn get_snapshots(
        &self,
        server_keys: &[String],
    ) -> Result<Vec<Option<String>>, NetworkError>;

    async fn close(&self);
}
