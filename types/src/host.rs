//! Injected host interface.
//!
//! The query service never reaches into the game runtime directly. The
//! embedding server implements [`ServerHost`] and the service reads identity
//! and player data through it, substituting defaults when a lookup fails.
//! This keeps the whole core unit-testable against a fake host.

use thiserror::Error;

use crate::player::Player;

/// Default server name when the host cannot provide one.
pub const DEFAULT_SERVER_NAME: &str = "Hytale Server";
/// Default maximum player count when the host cannot provide one.
pub const DEFAULT_MAX_PLAYERS: i32 = 100;
/// Default game bind port when the host cannot provide one.
pub const DEFAULT_BIND_PORT: u16 = 5520;
/// Default version string when the host cannot provide one.
pub const DEFAULT_VERSION: &str = "Unknown";

/// A host-side lookup failed.
#[derive(Debug, Error)]
#[error("host unavailable: {0}")]
pub struct HostError(pub String);

/// Access to the co-hosted game server's identity and live state.
///
/// Implementations may fail on any lookup (the game runtime may not be fully
/// initialized); callers go through [`HostSnapshot::capture`], which absorbs
/// failures into defaults.
pub trait ServerHost: Send + Sync {
    fn server_name(&self) -> Result<String, HostError>;
    fn motd(&self) -> Result<String, HostError>;
    fn max_players(&self) -> Result<i32, HostError>;
    fn bind_port(&self) -> Result<u16, HostError>;
    fn version(&self) -> Result<String, HostError>;
    fn players(&self) -> Result<Vec<Player>, HostError>;
    fn plugins(&self) -> Result<Vec<String>, HostError>;

    /// Game protocol version advertised in V2 server info.
    fn protocol_version(&self) -> i32 {
        0
    }

    /// Game protocol hash advertised in V2 server info.
    fn protocol_hash(&self) -> String {
        "00000000".to_string()
    }

    /// Publicly reachable address, if the operator has configured one.
    /// Only consulted when a V2 caller explicitly asks for the address.
    fn public_address(&self) -> Option<(String, u16)> {
        None
    }
}

/// A point-in-time copy of everything the host exposes, with defaults
/// substituted for failed lookups.
#[derive(Clone, Debug)]
pub struct HostSnapshot {
    pub server_name: String,
    pub motd: String,
    pub max_players: i32,
    pub bind_port: u16,
    pub version: String,
    pub players: Vec<Player>,
    pub plugins: Vec<String>,
}

impl HostSnapshot {
    /// Read every host field, falling back to defaults on failure.
    pub fn capture(host: &dyn ServerHost) -> Self {
        Self {
            server_name: host
                .server_name()
                .unwrap_or_else(|_| DEFAULT_SERVER_NAME.to_string()),
            motd: host.motd().unwrap_or_default(),
            max_players: host.max_players().unwrap_or(DEFAULT_MAX_PLAYERS),
            bind_port: host.bind_port().unwrap_or(DEFAULT_BIND_PORT),
            version: host
                .version()
                .unwrap_or_else(|_| DEFAULT_VERSION.to_string()),
            players: host.players().unwrap_or_default(),
            plugins: host.plugins().unwrap_or_default(),
        }
    }

    /// Number of currently connected players.
    pub fn online_players(&self) -> i32 {
        self.players.len() as i32
    }
}
