//! Fundamental types for the HyQuery service.
//!
//! This crate defines the core types shared across every other crate in the
//! workspace: players, the injected host interface, worker authorization and
//! state, store snapshots, and the network aggregate.

pub mod aggregate;
pub mod host;
pub mod player;
pub mod snapshot;
pub mod worker;

pub use aggregate::{NetworkAggregate, NetworkPlayer, RemoteServer};
pub use host::{HostError, HostSnapshot, ServerHost};
pub use player::Player;
pub use snapshot::RemoteSnapshot;
pub use worker::{WorkerEntry, WorkerState, STATUS_OFFLINE, STATUS_ONLINE};
