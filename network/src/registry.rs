//! Registry of worker servers, kept on the primary.
//!
//! Stores the latest accepted state per worker and answers the aggregation
//! queries the request handler needs. Entries older than the configured
//! timeout are treated as offline and excluded from totals.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::RwLock;

use hyquery_types::{NetworkPlayer, RemoteServer, WorkerEntry, WorkerState};

/// Thread-safe storage for worker states received via status packets.
pub struct WorkerRegistry {
    workers: RwLock<HashMap<String, WorkerState>>,
    entries: Vec<WorkerEntry>,
    timeout: Duration,
}

impl WorkerRegistry {
    pub fn new(entries: Vec<WorkerEntry>, timeout: Duration) -> Self {
        Self {
            workers: RwLock::new(HashMap::new()),
            entries,
            timeout,
        }
    }

    /// Find the first authorized entry matching a worker id (exact or
    /// `prefix*` wildcard). Configuration order decides ties.
    pub fn find_worker_entry(&self, worker_id: &str) -> Option<&WorkerEntry> {
        self.entries.iter().find(|entry| entry.matches(worker_id))
    }

    /// The key ACKs are signed with: the first configured worker entry's.
    pub fn ack_key(&self) -> &str {
        self.entries.first().map(|e| e.key.as_str()).unwrap_or("")
    }

    /// Replace the stored state for a worker. Last writer wins.
    pub fn update_worker(&self, state: WorkerState) {
        self.workers.write().insert(state.id.clone(), state);
    }

    pub fn get_worker(&self, worker_id: &str) -> Option<WorkerState> {
        self.workers.read().get(worker_id).cloned()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.read().len()
    }

    pub fn online_worker_count(&self) -> usize {
        self.workers
            .read()
            .values()
            .filter(|w| !w.is_stale(self.timeout))
            .count()
    }

    /// Sum of online players across workers that are not stale.
    pub fn total_online_players(&self) -> i32 {
        self.workers
            .read()
            .values()
            .filter(|w| !w.is_stale(self.timeout))
            .map(|w| w.online_players)
            .sum()
    }

    /// Sum of max players across workers that are not stale.
    pub fn total_max_players(&self) -> i32 {
        self.workers
            .read()
            .values()
            .filter(|w| !w.is_stale(self.timeout))
            .map(|w| w.max_players)
            .sum()
    }

    /// Every player on every non-stale worker, tagged with its source id.
    pub fn all_players(&self) -> Vec<NetworkPlayer> {
        let workers = self.workers.read();
        let mut players = Vec::new();
        for state in workers.values() {
            if state.is_stale(self.timeout) {
                continue;
            }
            for player in &state.players {
                players.push(NetworkPlayer::new(
                    player.username.clone(),
                    player.uuid,
                    state.id.clone(),
                ));
            }
        }
        players
    }

    /// Snapshot the non-stale workers as remote-server views. Workers past
    /// the timeout are never exposed in aggregates.
    pub fn remote_servers(&self, include_players: bool) -> Vec<RemoteServer> {
        self.workers
            .read()
            .values()
            .filter(|w| !w.is_stale(self.timeout))
            .map(|state| RemoteServer {
                server_id: state.id.clone(),
                server_name: state.server_name.clone(),
                motd: state.motd.clone(),
                online_players: state.online_players,
                max_players: state.max_players,
                port: state.port,
                version: state.version.clone(),
                status: state.status(self.timeout),
                updated_at_millis: state.last_update_millis(),
                players: if include_players {
                    state.players.clone()
                } else {
                    Vec::new()
                },
            })
            .collect()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
