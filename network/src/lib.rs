//! Networking layer for the HyQuery service.
//!
//! Handles packet classification on the shared game port, challenge-token
//! minting and verification, per-source rate limiting, and the two
//! interchangeable network coordinators (UDP push and shared-store).

pub mod challenge;
pub mod config;
pub mod coordinator;
pub mod demux;
pub mod error;
pub mod manager;
pub mod observability;
pub mod rate_limit;
pub mod registry;
pub mod snapshot_store;
pub mod store_coordinator;
pub mod udp;

pub use challenge::ChallengeService;
pub use config::{NetworkConfig, ObservabilityConfig, PrimaryTarget, StoreConfig};
pub use coordinator::{CacheInvalidate, NetworkCoordinator};
pub use demux::{classify, PacketKind};
pub use error::NetworkError;
pub use manager::NetworkManager;
pub use observability::{LogLevel, MetricsDetail, NetworkObservability};
pub use rate_limit::QueryRateLimiter;
pub use registry::WorkerRegistry;
pub use snapshot_store::SnapshotStore;
pub use store_coordinator::StoreCoordinator;
pub use udp::UdpCoordinator;
