//! Nullable host — a programmable game server identity for testing.

use parking_lot::Mutex;
use uuid::Uuid;

use hyquery_types::{HostError, Player, ServerHost};

struct HostState {
    server_name: String,
    motd: String,
    max_players: i32,
    bind_port: u16,
    version: String,
    players: Vec<Player>,
    plugins: Vec<String>,
    protocol_version: i32,
    protocol_hash: String,
    public_address: Option<(String, u16)>,
    fail_players: bool,
}

/// An in-memory [`ServerHost`] for testing.
/// Thread-safe for use with tokio's multi-threaded runtime.
pub struct NullHost {
    state: Mutex<HostState>,
}

impl NullHost {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HostState {
                server_name: "Hytale Server".to_string(),
                motd: "hi".to_string(),
                max_players: 100,
                bind_port: 5520,
                version: "1.0".to_string(),
                players: Vec::new(),
                plugins: Vec::new(),
                protocol_version: 0,
                protocol_hash: "00000000".to_string(),
                public_address: None,
                fail_players: false,
            }),
        }
    }

    pub fn with_server_name(self, name: &str) -> Self {
        self.state.lock().server_name = name.to_string();
        self
    }

    pub fn with_motd(self, motd: &str) -> Self {
        self.state.lock().motd = motd.to_string();
        self
    }

    pub fn with_max_players(self, max: i32) -> Self {
        self.state.lock().max_players = max;
        self
    }

    pub fn with_bind_port(self, port: u16) -> Self {
        self.state.lock().bind_port = port;
        self
    }

    pub fn with_version(self, version: &str) -> Self {
        self.state.lock().version = version.to_string();
        self
    }

    pub fn with_plugins(self, plugins: &[&str]) -> Self {
        self.state.lock().plugins = plugins.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_public_address(self, host: &str, port: u16) -> Self {
        self.state.lock().public_address = Some((host.to_string(), port));
        self
    }

    /// Add a player with a deterministic UUID derived from `raw`.
    pub fn add_player(&self, username: &str, raw: u128) {
        self.state
            .lock()
            .players
            .push(Player::new(username, Uuid::from_u128(raw)));
    }

    pub fn set_players(&self, players: Vec<Player>) {
        self.state.lock().players = players;
    }

    /// Make `players()` fail, exercising the handler's default substitution.
    pub fn fail_players(&self) {
        self.state.lock().fail_players = true;
    }
}

impl Default for NullHost {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerHost for NullHost {
    fn server_name(&self) -> Result<String, HostError> {
        Ok(self.state.lock().server_name.clone())
    }

    fn motd(&self) -> Result<String, HostError> {
        Ok(self.state.lock().motd.clone())
    }

    fn max_players(&self) -> Result<i32, HostError> {
        Ok(self.state.lock().max_players)
    }

    fn bind_port(&self) -> Result<u16, HostError> {
        Ok(self.state.lock().bind_port)
    }

    fn version(&self) -> Result<String, HostError> {
        Ok(self.state.lock().version.clone())
    }

    fn players(&self) -> Result<Vec<Player>, HostError> {
        let state = self.state.lock();
        if state.fail_players {
            return Err(HostError("player enumeration failed".to_string()));
        }
        Ok(state.players.clone())
    }

    fn plugins(&self) -> Result<Vec<String>, HostError> {
        Ok(self.state.lock().plugins.clone())
    }

    fn protocol_version(&self) -> i32 {
        self.state.lock().protocol_version
    }

    fn protocol_hash(&self) -> String {
        self.state.lock().protocol_hash.clone()
    }

    fn public_address(&self) -> Option<(String, u16)> {
        self.state.lock().public_address.clone()
    }
}
