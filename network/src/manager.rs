//! Network manager: coordinator selection, lifecycle, and metrics reporting.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use hyquery_types::{NetworkAggregate, ServerHost};
use hyquery_utils::PeriodicTask;

use crate::config::NetworkConfig;
use crate::coordinator::{CacheInvalidate, NetworkCoordinator};
use crate::error::NetworkError;
use crate::observability::NetworkObservability;
use crate::snapshot_store::SnapshotStore;
use crate::store_coordinator::{start_worker_publisher, StoreCoordinator};
use crate::udp::UdpCoordinator;

/// How often the metrics reporter logs a counter summary.
const METRICS_REPORT_INTERVAL: Duration = Duration::from_secs(60);

/// Owns the selected coordinator and its background tasks.
pub struct NetworkManager {
    config: NetworkConfig,
    observability: Arc<NetworkObservability>,
    coordinator: Arc<dyn NetworkCoordinator>,
    metrics_task: Mutex<Option<PeriodicTask>>,
}

impl NetworkManager {
    /// Build and start the coordinator selected by the configuration.
    ///
    /// `snapshot_store` must be provided when the configuration selects the
    /// store coordinator; the driver itself lives outside this crate.
    pub async fn start(
        config: NetworkConfig,
        host: Arc<dyn ServerHost>,
        custom_motd: Option<String>,
        cache_hook: Option<Arc<dyn CacheInvalidate>>,
        snapshot_store: Option<Arc<dyn SnapshotStore>>,
    ) -> Result<Self, NetworkError> {
        let observability = Arc::new(NetworkObservability::new(&config.observability));

        let coordinator: Arc<dyn NetworkCoordinator> = if config.is_redis_coordinator() {
            let store = snapshot_store.ok_or_else(|| {
                NetworkError::Startup(
                    "coordinator=redis requires a snapshot store driver".to_string(),
                )
            })?;
            let store_coordinator = Arc::new(StoreCoordinator::new(
                config.clone(),
                observability.clone(),
                host,
                custom_motd,
                store,
            ));
            store_coordinator.start().await?;
            start_worker_publisher(&store_coordinator);
            store_coordinator
        } else {
            let udp = Arc::new(UdpCoordinator::new(
                config.clone(),
                observability.clone(),
                host,
                custom_motd,
                cache_hook,
            ));
            udp.start().await?;
            udp
        };

        let manager = Self {
            config,
            observability,
            coordinator,
            metrics_task: Mutex::new(None),
        };
        manager.start_metrics_reporter();
        Ok(manager)
    }

    /// Stop background tasks and the coordinator, logging a final summary.
    pub async fn stop(&self) {
        if let Some(task) = self.metrics_task.lock().take() {
            task.cancel();
        }

        self.coordinator.stop().await;
        if self.observability.metrics_enabled() {
            self.observability.info(&format!(
                "Network metrics summary: {}",
                self.coordinator.metrics_summary()
            ));
        }
    }

    /// Whether inbound `HYSTATUS` packets should be handed to this manager.
    pub fn handles_status_packets(&self) -> bool {
        self.coordinator.handles_status_packets()
    }

    /// Process a worker status packet; returns the ACK to send, if any.
    pub async fn process_status_update(
        &self,
        packet: &[u8],
        sender: SocketAddr,
    ) -> Option<Vec<u8>> {
        self.coordinator.process_status_update(packet, sender).await
    }

    /// Aggregated remote network data for query responses.
    pub async fn get_aggregate(
        &self,
        include_players: bool,
    ) -> Result<NetworkAggregate, NetworkError> {
        if !self.config.is_primary() {
            return Ok(NetworkAggregate::empty());
        }
        self.coordinator.get_aggregate(include_players).await
    }

    pub fn is_primary(&self) -> bool {
        self.config.is_primary()
    }

    pub fn is_worker(&self) -> bool {
        self.config.is_worker()
    }

    fn start_metrics_reporter(&self) {
        if !self.observability.metrics_enabled() {
            return;
        }

        let coordinator = self.coordinator.clone();
        let observability = self.observability.clone();
        let task = PeriodicTask::spawn(
            "hyquery-network-metrics",
            METRICS_REPORT_INTERVAL,
            METRICS_REPORT_INTERVAL,
            move || {
                let coordinator = coordinator.clone();
                let observability = observability.clone();
                async move {
                    observability
                        .info(&format!("Network metrics: {}", coordinator.metrics_summary()));
                }
            },
        );
        *self.metrics_task.lock() = Some(task);
    }
}
