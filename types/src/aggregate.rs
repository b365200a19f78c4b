//! Network-wide aggregate derived from the coordinator's remote view.

use uuid::Uuid;

use crate::player::Player;

/// A remote server as seen in the aggregate.
#[derive(Clone, Debug)]
pub struct RemoteServer {
    pub server_id: String,
    pub server_name: String,
    pub motd: String,
    pub online_players: i32,
    pub max_players: i32,
    pub port: i32,
    pub version: String,
    pub status: u8,
    pub updated_at_millis: i64,
    pub players: Vec<Player>,
}

/// A player on a remote server, tagged with its source server id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkPlayer {
    pub username: String,
    pub uuid: Uuid,
    pub server_id: String,
}

impl NetworkPlayer {
    pub fn new(username: impl Into<String>, uuid: Uuid, server_id: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            uuid,
            server_id: server_id.into(),
        }
    }
}

/// Fleet state composed on demand for network-wide query responses.
///
/// Purely derived from the coordinator; an empty aggregate means the server
/// is not a primary, has no coordinator, or no fresh remote data exists.
#[derive(Clone, Debug, Default)]
pub struct NetworkAggregate {
    pub total_online: i32,
    pub total_max: i32,
    pub remote_servers: Vec<RemoteServer>,
    pub network_players: Vec<NetworkPlayer>,
}

impl NetworkAggregate {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether any remote server contributed to this aggregate.
    pub fn is_empty(&self) -> bool {
        self.remote_servers.is_empty()
    }
}
