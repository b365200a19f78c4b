//! Worker authorization entries and primary-side worker state.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::player::Player;

/// Wire status byte: worker has not reported within the timeout.
pub const STATUS_OFFLINE: u8 = 0x00;
/// Wire status byte: worker reported recently.
pub const STATUS_ONLINE: u8 = 0x01;

/// An authorized worker in the primary's configuration.
///
/// The id pattern is either an exact worker id or a `prefix*` wildcard
/// (e.g. `minigame-*` matches `minigame-bedwars-1`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerEntry {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub key: String,
}

impl WorkerEntry {
    pub fn new(id: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            key: key.into(),
        }
    }

    /// Whether this entry authorizes the given worker id.
    pub fn matches(&self, worker_id: &str) -> bool {
        match self.id.strip_suffix('*') {
            Some(prefix) => worker_id.starts_with(prefix),
            None => self.id == worker_id,
        }
    }
}

/// State of a worker server as last reported to the primary.
///
/// A fresh instance replaces the previous one on every accepted status
/// packet; fields are immutable after construction. Staleness is judged on
/// the monotonic clock; the wall-clock millis are kept for wire echo.
#[derive(Clone, Debug)]
pub struct WorkerState {
    pub id: String,
    pub server_name: String,
    pub motd: String,
    pub online_players: i32,
    pub max_players: i32,
    pub port: i32,
    pub version: String,
    pub players: Vec<Player>,
    last_update: Instant,
    last_update_millis: i64,
}

impl WorkerState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: String,
        server_name: String,
        motd: String,
        online_players: i32,
        max_players: i32,
        port: i32,
        version: String,
        players: Vec<Player>,
        last_update_millis: i64,
    ) -> Self {
        Self {
            id,
            server_name,
            motd,
            online_players,
            max_players,
            port,
            version,
            players,
            last_update: Instant::now(),
            last_update_millis,
        }
    }

    /// Monotonic timestamp of the last accepted update.
    pub fn last_update(&self) -> Instant {
        self.last_update
    }

    /// Wall-clock millis of the last accepted update.
    pub fn last_update_millis(&self) -> i64 {
        self.last_update_millis
    }

    /// Whether this worker has gone without an update for longer than the
    /// configured timeout.
    pub fn is_stale(&self, timeout: Duration) -> bool {
        self.last_update.elapsed() > timeout
    }

    /// Wire status byte for this worker given the configured timeout.
    pub fn status(&self, timeout: Duration) -> u8 {
        if self.is_stale(timeout) {
            STATUS_OFFLINE
        } else {
            STATUS_ONLINE
        }
    }
}
