//! UDP coordinator: authenticated worker→primary status push.
//!
//! Workers build a signed status frame on a fixed interval and push it to
//! every configured primary over a single socket. Primaries verify inbound
//! frames against the authorized worker list and keep the registry current,
//! answering each frame with a signed ACK.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::net::UdpSocket;

use hyquery_protocol::status::{
    self, StatusPacket, ACK_BAD_HMAC, ACK_OK, ACK_STALE, ACK_UNKNOWN_ID,
};
use hyquery_types::{HostSnapshot, NetworkAggregate, ServerHost, WorkerState};
use hyquery_utils::time::unix_millis;
use hyquery_utils::PeriodicTask;

use crate::config::NetworkConfig;
use crate::coordinator::{CacheInvalidate, NetworkCoordinator};
use crate::error::NetworkError;
use crate::observability::NetworkObservability;
use crate::registry::WorkerRegistry;

/// Status packets whose timestamp deviates more than this from local time
/// are rejected as stale.
const STATUS_SKEW_LIMIT_MILLIS: i64 = 30_000;

/// Coordinator for the UDP worker/primary push protocol.
pub struct UdpCoordinator {
    config: NetworkConfig,
    observability: Arc<NetworkObservability>,
    host: Arc<dyn ServerHost>,
    custom_motd: Option<String>,
    cache_hook: Option<Arc<dyn CacheInvalidate>>,
    registry: Option<Arc<WorkerRegistry>>,
    publisher: Mutex<Option<PeriodicTask>>,
}

impl UdpCoordinator {
    pub fn new(
        config: NetworkConfig,
        observability: Arc<NetworkObservability>,
        host: Arc<dyn ServerHost>,
        custom_motd: Option<String>,
        cache_hook: Option<Arc<dyn CacheInvalidate>>,
    ) -> Self {
        let registry = if config.is_primary() {
            Some(Arc::new(WorkerRegistry::new(
                config.workers.clone(),
                Duration::from_secs(config.worker_timeout_seconds as u64),
            )))
        } else {
            None
        };

        Self {
            config,
            observability,
            host,
            custom_motd,
            cache_hook,
            registry,
            publisher: Mutex::new(None),
        }
    }

    /// Primary-side registry, for status reporting and tests.
    pub fn registry(&self) -> Option<Arc<WorkerRegistry>> {
        self.registry.clone()
    }

    fn start_primary(&self) {
        self.observability.info("Network mode: PRIMARY (coordinator=udp)");
        self.observability.info(&format!(
            "  - Worker timeout: {}s",
            self.config.worker_timeout_seconds
        ));
        self.observability.info(&format!(
            "  - Authorized workers: {}",
            self.config.workers.len()
        ));
        for entry in &self.config.workers {
            self.observability.info(&format!("    - {}", entry.id));
        }
    }

    async fn start_worker(&self) -> Result<(), NetworkError> {
        let targets = self.config.primary_targets();
        if targets.is_empty() {
            self.observability
                .warn("Network mode: WORKER (coordinator=udp) - no primary servers configured");
            return Ok(());
        }

        self.observability.info("Network mode: WORKER (coordinator=udp)");
        self.observability
            .info(&format!("  - Worker ID: {}", self.config.id));
        self.observability.info(&format!(
            "  - Update interval: {}s",
            self.config.update_interval_seconds
        ));

        let mut addresses = Vec::new();
        if targets.len() == 1 {
            self.observability
                .info(&format!("  - Primary: {}", targets[0]));
        } else {
            self.observability.info(&format!(
                "  - Hub clustering: sending to {} primaries",
                targets.len()
            ));
        }
        for target in &targets {
            match tokio::net::lookup_host((target.host.as_str(), target.port)).await {
                Ok(mut resolved) => match resolved.next() {
                    Some(addr) => {
                        addresses.push(addr);
                        if targets.len() > 1 {
                            self.observability.info(&format!("    - {target}"));
                        }
                    }
                    None => self
                        .observability
                        .warn(&format!("Primary {target} resolved to no addresses")),
                },
                Err(e) => self
                    .observability
                    .warn(&format!("Failed to resolve primary {target}: {e}")),
            }
        }
        if addresses.is_empty() {
            self.observability
                .warn("No primary addresses resolved; worker updates disabled");
            return Ok(());
        }

        let socket = Arc::new(UdpSocket::bind("0.0.0.0:0").await?);
        let interval = Duration::from_secs(self.config.update_interval_seconds as u64);

        let publisher = StatusPublisher {
            socket,
            targets: addresses,
            observability: self.observability.clone(),
            host: self.host.clone(),
            custom_motd: self.custom_motd.clone(),
            worker_id: self.config.id.clone(),
            key: self.config.key.clone(),
            log_updates: self.config.log_status_updates,
        };
        let publisher = Arc::new(publisher);

        let task = PeriodicTask::spawn("hyquery-udp-worker", interval, interval, move || {
            let publisher = publisher.clone();
            async move {
                publisher.send_status_update().await;
            }
        });
        *self.publisher.lock() = Some(task);

        self.observability.info("UDP worker status updates started");
        Ok(())
    }
}

#[async_trait]
impl NetworkCoordinator for UdpCoordinator {
    async fn start(&self) -> Result<(), NetworkError> {
        if !self.config.enabled {
            return Ok(());
        }

        if self.config.is_primary() {
            self.start_primary();
        } else if self.config.is_worker() {
            self.start_worker().await?;
        }
        Ok(())
    }

    async fn stop(&self) {
        if let Some(task) = self.publisher.lock().take() {
            task.cancel();
        }
    }

    fn handles_status_packets(&self) -> bool {
        self.config.is_primary()
    }

    async fn process_status_update(&self, packet: &[u8], sender: SocketAddr) -> Option<Vec<u8>> {
        let registry = self.registry.as_ref()?;
        let ack_key = registry.ack_key();

        let status = match status::parse_status_packet(packet) {
            Ok(status) => status,
            Err(_) => {
                self.observability
                    .warn(&format!("Rejected invalid status packet from {sender} (malformed packet)"));
                self.observability.record_status_rejected();
                return Some(status::build_ack_packet(ACK_BAD_HMAC, 0, ack_key));
            }
        };

        let entry = match registry.find_worker_entry(&status.worker_id) {
            Some(entry) => entry,
            None => {
                self.observability.warn(&format!(
                    "Rejected status from {sender} - unknown worker ID: {}",
                    status.worker_id
                ));
                self.observability.record_status_rejected();
                return Some(status::build_ack_packet(
                    ACK_UNKNOWN_ID,
                    status.timestamp_millis,
                    ack_key,
                ));
            }
        };

        if !status::verify_status_hmac(packet, &entry.key) {
            self.observability.warn(&format!(
                "Rejected status from worker '{}' - invalid HMAC (check keys match)",
                status.worker_id
            ));
            self.observability.record_status_rejected();
            return Some(status::build_ack_packet(
                ACK_BAD_HMAC,
                status.timestamp_millis,
                ack_key,
            ));
        }

        let now = unix_millis();
        if (now - status.timestamp_millis).abs() > STATUS_SKEW_LIMIT_MILLIS {
            self.observability.warn(&format!(
                "Rejected status from worker '{}' - stale timestamp (clock sync issue?)",
                status.worker_id
            ));
            self.observability.record_status_rejected();
            return Some(status::build_ack_packet(
                ACK_STALE,
                status.timestamp_millis,
                ack_key,
            ));
        }

        let is_new_worker = registry.get_worker(&status.worker_id).is_none();
        let state = WorkerState::new(
            status.worker_id.clone(),
            status.server_name,
            status.motd,
            status.online_players,
            status.max_players,
            status.port,
            status.version,
            status.players,
            status.timestamp_millis,
        );
        registry.update_worker(state);
        self.observability.record_status_accepted();

        if self.config.log_status_updates {
            let worker_total = registry.total_online_players();
            if is_new_worker {
                self.observability.info(&format!(
                    "Worker '{}' connected ({} players) - Workers: {worker_total}",
                    status.worker_id, status.online_players
                ));
            } else {
                self.observability.info(&format!(
                    "Received update from '{}' ({}/{} players) - Workers: {worker_total}",
                    status.worker_id, status.online_players, status.max_players
                ));
            }
        }

        if let Some(cache) = &self.cache_hook {
            cache.invalidate();
        }

        Some(status::build_ack_packet(
            ACK_OK,
            status.timestamp_millis,
            ack_key,
        ))
    }

    async fn get_aggregate(
        &self,
        include_players: bool,
    ) -> Result<NetworkAggregate, NetworkError> {
        let registry = match (&self.registry, self.config.is_primary()) {
            (Some(registry), true) => registry,
            _ => return Ok(NetworkAggregate::empty()),
        };

        let network_players = if include_players {
            registry.all_players()
        } else {
            Vec::new()
        };

        Ok(NetworkAggregate {
            total_online: registry.total_online_players(),
            total_max: registry.total_max_players(),
            remote_servers: registry.remote_servers(include_players),
            network_players,
        })
    }

    fn metrics_summary(&self) -> String {
        self.observability.metrics_summary()
    }
}

/// Worker-side publisher state captured by the periodic task.
struct StatusPublisher {
    socket: Arc<UdpSocket>,
    targets: Vec<SocketAddr>,
    observability: Arc<NetworkObservability>,
    host: Arc<dyn ServerHost>,
    custom_motd: Option<String>,
    worker_id: String,
    key: String,
    log_updates: bool,
}

impl StatusPublisher {
    async fn send_status_update(&self) {
        self.observability.record_publish_attempt();
        let started = std::time::Instant::now();

        let snapshot = HostSnapshot::capture(self.host.as_ref());
        let motd = self
            .custom_motd
            .clone()
            .unwrap_or_else(|| snapshot.motd.clone());

        let packet = StatusPacket {
            worker_id: self.worker_id.clone(),
            server_name: snapshot.server_name.clone(),
            motd,
            online_players: snapshot.online_players(),
            max_players: snapshot.max_players,
            port: snapshot.bind_port as i32,
            version: snapshot.version.clone(),
            players: snapshot.players.clone(),
            timestamp_millis: unix_millis(),
        };
        let data = status::build_status_packet(&packet, &self.key);

        let mut success_count = 0usize;
        let mut fail_count = 0usize;
        for target in &self.targets {
            match self.socket.send_to(&data, target).await {
                Ok(sent) if sent > 0 => success_count += 1,
                Ok(_) => {
                    fail_count += 1;
                    self.observability.warn(&format!(
                        "Failed to send status update to {target} - no bytes sent"
                    ));
                }
                Err(e) => {
                    fail_count += 1;
                    self.observability
                        .warn(&format!("Failed to send status update to {target} - {e}"));
                }
            }
        }

        if success_count > 0 {
            self.observability
                .record_publish_success(started.elapsed().as_millis() as u64);
        }
        if fail_count > 0 {
            self.observability.record_publish_failure();
        }

        if self.log_updates {
            if self.targets.len() == 1 && success_count > 0 {
                self.observability.info(&format!(
                    "Sent status update to {} ({}/{} players)",
                    self.targets[0],
                    packet.online_players,
                    packet.max_players
                ));
            } else {
                self.observability.info(&format!(
                    "Sent status update to {success_count}/{} primaries ({}/{} players)",
                    self.targets.len(),
                    packet.online_players,
                    packet.max_players
                ));
            }
        }
    }
}
