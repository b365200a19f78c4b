//! Shared utilities: logging setup, wall-clock helpers, and the periodic
//! task scheduler used by publishers and the metrics reporter.

pub mod logging;
pub mod scheduler;
pub mod time;

pub use scheduler::PeriodicTask;
