//! HyQuery node — wires the query subsystems together.
//!
//! The node owns configuration, the response cache, the request handler,
//! and the service lifecycle that the embedding game server drives:
//! load a config, start the service, feed it datagrams, shut it down.

pub mod cache;
pub mod config;
pub mod error;
pub mod handler;
pub mod service;

pub use cache::{ResponseCache, ResponseKind};
pub use config::{AuthPermissions, QueryConfig};
pub use error::NodeError;
pub use handler::{HandlerAction, QueryHandler};
pub use service::QueryService;
