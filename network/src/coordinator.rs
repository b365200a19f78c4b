//! Coordinator abstraction shared by the UDP and store backends.

use std::net::SocketAddr;

use async_trait::async_trait;

use hyquery_types::NetworkAggregate;

use crate::error::NetworkError;

/// Hook for invalidating the response cache when remote state changes.
///
/// Implemented by the node layer; keeps the coordinator from depending on
/// the cache type directly.
pub trait CacheInvalidate: Send + Sync {
    fn invalidate(&self);
}

/// One of the interchangeable network coordinator backends.
#[async_trait]
pub trait NetworkCoordinator: Send + Sync {
    /// Start background work (registry setup, publisher tasks). Fail-closed
    /// backends return an error when their dependency is unreachable.
    async fn start(&self) -> Result<(), NetworkError>;

    /// Stop background work and release resources.
    async fn stop(&self);

    /// Whether this coordinator accepts inbound `HYSTATUS` packets.
    fn handles_status_packets(&self) -> bool;

    /// Process a worker status packet and produce the ACK to send back,
    /// if any.
    async fn process_status_update(&self, packet: &[u8], sender: SocketAddr) -> Option<Vec<u8>>;

    /// Aggregate remote fleet state. Store-backed primaries fail closed:
    /// a read error propagates instead of degrading to local-only data.
    async fn get_aggregate(&self, include_players: bool)
        -> Result<NetworkAggregate, NetworkError>;

    /// One-line counter summary for periodic metrics logging.
    fn metrics_summary(&self) -> String;
}
