//! Shared-store coordinator.
//!
//! Workers publish JSON snapshots to a keyed index in an external store;
//! primaries read the index, evict stale entries, and aggregate. This mode
//! is fail-closed: an unreachable store aborts startup, and a read failure
//! surfaces to the query path instead of degrading to local-only answers.
//! Publish failures only trigger exponential backoff.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::distributions::Alphanumeric;
use rand::Rng;

use hyquery_types::{
    HostSnapshot, NetworkAggregate, NetworkPlayer, RemoteServer, RemoteSnapshot, ServerHost,
    STATUS_ONLINE,
};
use hyquery_utils::time::unix_millis;
use hyquery_utils::PeriodicTask;

use crate::config::NetworkConfig;
use crate::coordinator::NetworkCoordinator;
use crate::error::NetworkError;
use crate::observability::NetworkObservability;
use crate::snapshot_store::SnapshotStore;

const KEY_PREFIX: &str = "hyquery";
const AGGREGATE_CACHE_TTL: Duration = Duration::from_secs(1);
const MAX_PUBLISH_BACKOFF: Duration = Duration::from_secs(60);
const RANDOM_ID_LENGTH: usize = 8;

fn index_key(namespace: &str) -> String {
    format!("{KEY_PREFIX}:{{{namespace}}}:index")
}

fn server_key(namespace: &str, server_id: &str) -> String {
    format!("{KEY_PREFIX}:{{{namespace}}}:server:{server_id}")
}

struct CachedAggregate {
    aggregate: NetworkAggregate,
    loaded_at: Instant,
}

#[derive(Default)]
struct BackoffState {
    consecutive_failures: u32,
    next_attempt: Option<Instant>,
}

/// Coordinator backed by a shared key-value + sorted-index store.
pub struct StoreCoordinator {
    config: NetworkConfig,
    observability: Arc<NetworkObservability>,
    host: Arc<dyn ServerHost>,
    custom_motd: Option<String>,
    store: Arc<dyn SnapshotStore>,

    read_namespaces: Vec<String>,
    publish_namespace: String,
    stale_after_millis: i64,
    snapshot_ttl_seconds: u64,
    publish_interval: Duration,
    worker_server_id: String,
    worker_id_generated: bool,

    publisher: Mutex<Option<PeriodicTask>>,
    cached_without_players: Mutex<Option<CachedAggregate>>,
    cached_with_players: Mutex<Option<CachedAggregate>>,
    backoff: Mutex<BackoffState>,
}

impl StoreCoordinator {
    pub fn new(
        config: NetworkConfig,
        observability: Arc<NetworkObservability>,
        host: Arc<dyn ServerHost>,
        custom_motd: Option<String>,
        store: Arc<dyn SnapshotStore>,
    ) -> Self {
        let read_namespaces = config.read_namespaces();
        let publish_namespace = config.publish_namespace();
        let stale_after_millis = config.stale_after_seconds.max(1) as i64 * 1000;
        let publish_interval_seconds = config.redis.publish_interval_seconds.max(1) as u64;
        let snapshot_ttl_seconds = (config.stale_after_seconds as u64 * 2)
            .max(publish_interval_seconds * 3)
            .max(1);

        let configured_id = config.id.trim().to_string();
        let (worker_server_id, worker_id_generated) = if configured_id.is_empty() {
            (generate_random_worker_id(), true)
        } else {
            (configured_id, false)
        };

        Self {
            config,
            observability,
            host,
            custom_motd,
            store,
            read_namespaces,
            publish_namespace,
            stale_after_millis,
            snapshot_ttl_seconds,
            publish_interval: Duration::from_secs(publish_interval_seconds),
            worker_server_id,
            worker_id_generated,
            publisher: Mutex::new(None),
            cached_without_players: Mutex::new(None),
            cached_with_players: Mutex::new(None),
            backoff: Mutex::new(BackoffState::default()),
        }
    }

    /// The worker id snapshots are published under (generated at startup
    /// when the configured id is blank).
    pub fn worker_server_id(&self) -> &str {
        &self.worker_server_id
    }

    fn start_publisher(self: &Arc<Self>) {
        let coordinator = self.clone();
        let task = PeriodicTask::spawn(
            "hyquery-store-worker",
            Duration::ZERO,
            self.publish_interval,
            move || {
                let coordinator = coordinator.clone();
                async move {
                    coordinator.publish_local_snapshot().await;
                }
            },
        );
        *self.publisher.lock() = Some(task);

        self.observability.info(&format!(
            "Store worker snapshot publishing started (interval={}s)",
            self.publish_interval.as_secs()
        ));
    }

    async fn publish_local_snapshot(&self) {
        {
            let backoff = self.backoff.lock();
            if let Some(next_attempt) = backoff.next_attempt {
                if Instant::now() < next_attempt {
                    return;
                }
            }
        }

        let started = Instant::now();
        self.observability.record_publish_attempt();

        let payload = self.build_local_snapshot();
        let json = match serde_json::to_string(&payload) {
            Ok(json) => json,
            Err(e) => {
                self.observability.record_publish_failure();
                self.observability
                    .warn(&format!("Failed to serialize snapshot: {e}"));
                return;
            }
        };

        let result = self
            .store
            .publish_snapshot(
                &server_key(&self.publish_namespace, &payload.server_id),
                &index_key(&self.publish_namespace),
                self.snapshot_ttl_seconds,
                payload.updated_at_millis,
                &payload.server_id,
                &json,
            )
            .await;

        match result {
            Ok(()) => {
                let recovered_after = {
                    let mut backoff = self.backoff.lock();
                    let failures = backoff.consecutive_failures;
                    backoff.consecutive_failures = 0;
                    backoff.next_attempt = None;
                    failures
                };
                if recovered_after > 0 {
                    self.observability.warn(&format!(
                        "Store publish recovered after {recovered_after} consecutive failure(s)"
                    ));
                }
                self.observability
                    .record_publish_success(started.elapsed().as_millis() as u64);

                if self.config.log_status_updates {
                    self.observability.info(&format!(
                        "Published snapshot for worker '{}' ({}/{} players)",
                        payload.server_id, payload.online_players, payload.max_players
                    ));
                }
            }
            Err(e) => {
                self.observability.record_publish_failure();
                self.handle_publish_failure(&e);
            }
        }
    }

    fn handle_publish_failure(&self, error: &NetworkError) {
        let mut backoff = self.backoff.lock();
        backoff.consecutive_failures += 1;
        let delay = compute_publish_backoff(backoff.consecutive_failures, self.publish_interval);
        backoff.next_attempt = Some(Instant::now() + delay);

        self.observability.warn(&format!(
            "Store publish failed ({} consecutive failure(s)): {error}. Backing off for {}ms.",
            backoff.consecutive_failures,
            delay.as_millis()
        ));
    }

    fn build_local_snapshot(&self) -> RemoteSnapshot {
        let snapshot = HostSnapshot::capture(self.host.as_ref());
        let motd = self
            .custom_motd
            .clone()
            .unwrap_or_else(|| snapshot.motd.clone());

        RemoteSnapshot {
            server_id: self.worker_server_id.clone(),
            server_name: snapshot.server_name.clone(),
            motd,
            online_players: snapshot.online_players(),
            max_players: snapshot.max_players,
            port: snapshot.bind_port as i32,
            version: snapshot.version.clone(),
            players: RemoteSnapshot::from_players(&snapshot.players),
            updated_at_millis: unix_millis(),
        }
    }

    async fn fetch_aggregate(
        &self,
        include_players: bool,
    ) -> Result<NetworkAggregate, NetworkError> {
        let started = Instant::now();
        self.observability.record_read_attempt();

        match self.fetch_aggregate_inner(include_players).await {
            Ok(aggregate) => {
                self.observability.record_read_success(
                    aggregate.remote_servers.len() as u64,
                    started.elapsed().as_millis() as u64,
                );
                Ok(aggregate)
            }
            Err(e) => {
                self.observability.record_read_failure();
                self.observability.error(&format!(
                    "Store coordinator read failed (hard-fail enforced): {e}"
                ));
                Err(e)
            }
        }
    }

    async fn fetch_aggregate_inner(
        &self,
        include_players: bool,
    ) -> Result<NetworkAggregate, NetworkError> {
        let now = unix_millis();
        let stale_cutoff = now - self.stale_after_millis;
        let mut by_server_id: std::collections::HashMap<String, RemoteSnapshot> =
            std::collections::HashMap::new();

        for namespace in &self.read_namespaces {
            let index = index_key(namespace);
            let evicted = self.store.evict_stale_servers(&index, stale_cutoff).await?;
            self.observability.record_stale_evictions(evicted);

            let active_ids = self.store.get_active_server_ids(&index, stale_cutoff).await?;
            if active_ids.is_empty() {
                continue;
            }

            let keys: Vec<String> = active_ids
                .iter()
                .map(|id| server_key(namespace, id))
                .collect();
            let raw_snapshots = self.store.get_snapshots(&keys).await?;

            for (i, raw) in raw_snapshots.iter().enumerate() {
                let Some(raw) = raw else { continue };
                if raw.trim().is_empty() {
                    continue;
                }

                let fallback_id = active_ids.get(i).map(String::as_str).unwrap_or("");
                let Some(payload) = self.parse_snapshot(raw, fallback_id) else {
                    continue;
                };
                if payload.updated_at_millis <= stale_cutoff {
                    continue;
                }

                let newer = match by_server_id.get(&payload.server_id) {
                    Some(existing) => payload.updated_at_millis > existing.updated_at_millis,
                    None => true,
                };
                if newer {
                    by_server_id.insert(payload.server_id.clone(), payload);
                }
            }
        }

        let mut remote_servers = Vec::with_capacity(by_server_id.len());
        let mut network_players = Vec::new();
        let mut total_online = 0i32;
        let mut total_max = 0i32;

        for payload in by_server_id.into_values() {
            let players = if include_players {
                payload.to_players()
            } else {
                Vec::new()
            };

            total_online += payload.online_players;
            total_max += payload.max_players;

            if include_players {
                for player in &players {
                    network_players.push(NetworkPlayer::new(
                        player.username.clone(),
                        player.uuid,
                        payload.server_id.clone(),
                    ));
                }
            }

            remote_servers.push(RemoteServer {
                server_id: payload.server_id,
                server_name: payload.server_name,
                motd: payload.motd,
                online_players: payload.online_players,
                max_players: payload.max_players,
                port: payload.port,
                version: payload.version,
                status: STATUS_ONLINE,
                updated_at_millis: payload.updated_at_millis,
                players,
            });
        }

        remote_servers.sort_by(|a, b| a.server_id.cmp(&b.server_id));

        Ok(NetworkAggregate {
            total_online,
            total_max,
            remote_servers,
            network_players,
        })
    }

    fn parse_snapshot(&self, raw: &str, fallback_server_id: &str) -> Option<RemoteSnapshot> {
        match serde_json::from_str::<RemoteSnapshot>(raw) {
            Ok(mut payload) => {
                if payload.server_id.trim().is_empty() {
                    payload.server_id = fallback_server_id.to_string();
                }
                if payload.server_id.trim().is_empty() {
                    return None;
                }
                Some(payload)
            }
            Err(e) => {
                self.observability
                    .warn(&format!("Failed to parse store snapshot JSON: {e}"));
                None
            }
        }
    }
}

#[async_trait]
impl NetworkCoordinator for StoreCoordinator {
    async fn start(&self) -> Result<(), NetworkError> {
        if !self.config.enabled {
            return Ok(());
        }

        if !self.config.redis.require_available {
            self.observability.warn(
                "network.redis.requireAvailable=false is ignored; hard-fail is always enforced",
            );
        }

        self.store
            .connect_and_validate()
            .await
            .map_err(|e| NetworkError::Startup(format!("store coordinator startup failed: {e}")))?;

        let mode = if self.config.is_primary() {
            "PRIMARY"
        } else {
            "WORKER"
        };
        self.observability
            .info(&format!("Network mode: {mode} (coordinator=redis)"));
        self.observability
            .info(&format!("  - Namespace: {}", self.publish_namespace));
        self.observability.info(&format!(
            "  - Read namespaces: {}",
            self.read_namespaces.join(", ")
        ));
        self.observability.info(&format!(
            "  - staleAfterSeconds: {}",
            self.config.stale_after_seconds
        ));
        self.observability.info(&format!(
            "  - Store endpoint: {}:{}",
            self.config.redis.host, self.config.redis.port
        ));
        self.observability
            .info(&format!("  - Store TLS: {}", self.config.redis.tls));
        if self.config.is_worker() && self.worker_id_generated {
            self.observability.warn(&format!(
                "network.id is missing/blank; generated worker ID for this runtime: {}",
                self.worker_server_id
            ));
        }

        Ok(())
    }

    async fn stop(&self) {
        if let Some(task) = self.publisher.lock().take() {
            task.cancel();
        }
        self.store.close().await;
        let mut backoff = self.backoff.lock();
        backoff.consecutive_failures = 0;
        backoff.next_attempt = None;
    }

    fn handles_status_packets(&self) -> bool {
        false
    }

    async fn process_status_update(&self, _packet: &[u8], _sender: SocketAddr) -> Option<Vec<u8>> {
        None
    }

    async fn get_aggregate(
        &self,
        include_players: bool,
    ) -> Result<NetworkAggregate, NetworkError> {
        if !self.config.is_primary() {
            return Ok(NetworkAggregate::empty());
        }

        {
            let cache = if include_players {
                self.cached_with_players.lock()
            } else {
                self.cached_without_players.lock()
            };
            if let Some(cached) = cache.as_ref() {
                if cached.loaded_at.elapsed() <= AGGREGATE_CACHE_TTL {
                    self.observability.record_cache_hit();
                    return Ok(cached.aggregate.clone());
                }
            }
        }

        self.observability.record_cache_miss();
        let aggregate = self.fetch_aggregate(include_players).await?;

        let fresh = CachedAggregate {
            aggregate: aggregate.clone(),
            loaded_at: Instant::now(),
        };
        if include_players {
            *self.cached_with_players.lock() = Some(fresh);
        } else {
            *self.cached_without_players.lock() = Some(fresh);
        }
        Ok(aggregate)
    }

    fn metrics_summary(&self) -> String {
        self.observability.metrics_summary()
    }
}

/// Extension point for the node layer: start the worker publisher after the
/// coordinator is wrapped in an `Arc` (the task needs a handle to clone).
pub fn start_worker_publisher(coordinator: &Arc<StoreCoordinator>) {
    if coordinator.config.is_worker() {
        coordinator.start_publisher();
    }
}

fn compute_publish_backoff(consecutive_failures: u32, publish_interval: Duration) -> Duration {
    let mut backoff = publish_interval;
    let shifts = consecutive_failures.saturating_sub(1);
    for _ in 0..shifts {
        if backoff >= MAX_PUBLISH_BACKOFF {
            break;
        }
        backoff = (backoff * 2).min(MAX_PUBLISH_BACKOFF);
    }
    backoff.max(publish_interval)
}

fn generate_random_worker_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(RANDOM_ID_LENGTH)
        .map(char::from)
        .collect()
}
