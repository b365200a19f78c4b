//! Nullable infrastructure for deterministic testing.
//!
//! The service's external dependencies (the game host and the shared
//! snapshot store) sit behind traits. This crate provides test-friendly
//! implementations that return programmable values, can inject failures,
//! and never touch the filesystem or network.
//!
//! Usage: swap real implementations for nullables in tests.

pub mod host;
pub mod store;

pub use host::NullHost;
pub use store::NullSnapshotStore;
