//! Service lifecycle: build subsystems, install the handler, tear down.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use hyquery_network::{
    CacheInvalidate, NetworkManager, QueryRateLimiter, SnapshotStore,
};
use hyquery_types::{HostSnapshot, ServerHost};

use crate::cache::ResponseCache;
use crate::config::QueryConfig;
use crate::error::NodeError;
use crate::handler::QueryHandler;

/// The embedded HyQuery service.
///
/// `setup` (config load) happens before construction; `start` builds the
/// rate limiter, cache, coordinator, and handler; `shutdown` stops
/// background tasks and releases the handler. The embedding transport calls
/// [`QueryService::handler`] and feeds every inbound datagram through it.
pub struct QueryService {
    config: QueryConfig,
    host: Arc<dyn ServerHost>,
    snapshot_store: Option<Arc<dyn SnapshotStore>>,
    handler: Mutex<Option<Arc<QueryHandler>>>,
    network: Mutex<Option<Arc<NetworkManager>>>,
}

impl QueryService {
    pub fn new(config: QueryConfig, host: Arc<dyn ServerHost>) -> Self {
        Self {
            config,
            host,
            snapshot_store: None,
            handler: Mutex::new(None),
            network: Mutex::new(None),
        }
    }

    /// Provide the store driver used when `network.coordinator` is `redis`.
    pub fn with_snapshot_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.snapshot_store = Some(store);
        self
    }

    /// Load the configuration from `<data-root>/HyQuery/config.json`.
    pub fn load_config(data_root: &Path) -> QueryConfig {
        QueryConfig::load_or_create(data_root)
    }

    /// Build every subsystem and make the handler available.
    ///
    /// Fail-closed coordinators abort startup here when their backing store
    /// is unreachable.
    pub async fn start(&self) -> Result<(), NodeError> {
        if !self.config.enabled {
            tracing::info!("HyQuery is disabled in config");
            return Ok(());
        }

        tracing::info!("HyQuery starting...");

        let rate_limiter = self.config.rate_limit_enabled.then(|| {
            tracing::info!(
                "rate limiting enabled: {} req/s, burst {}",
                self.config.rate_limit_per_second,
                self.config.rate_limit_burst
            );
            Arc::new(QueryRateLimiter::new(
                self.config.rate_limit_burst,
                self.config.rate_limit_per_second,
            ))
        });

        let cache = self.config.cache_enabled.then(|| {
            tracing::info!(
                "response caching enabled: {} second TTL",
                self.config.cache_ttl_seconds
            );
            Arc::new(ResponseCache::new(self.config.cache_ttl_seconds))
        });

        let network = if self.config.network.enabled {
            let cache_hook = cache
                .clone()
                .map(|cache| cache as Arc<dyn CacheInvalidate>);
            let manager = NetworkManager::start(
                self.config.network.clone(),
                self.host.clone(),
                self.config.custom_motd_override(),
                cache_hook,
                self.snapshot_store.clone(),
            )
            .await?;
            Some(Arc::new(manager))
        } else {
            None
        };

        let handler = Arc::new(QueryHandler::new(
            &self.config,
            self.host.clone(),
            rate_limiter,
            cache,
            network.clone(),
        ));

        *self.network.lock() = network;
        *self.handler.lock() = Some(handler);

        self.log_startup_summary();
        Ok(())
    }

    /// The installed handler, shared across every listener channel.
    /// `None` until `start` succeeds or when the service is disabled.
    pub fn handler(&self) -> Option<Arc<QueryHandler>> {
        self.handler.lock().clone()
    }

    /// Stop background tasks, close the store client, release the handler.
    pub async fn shutdown(&self) {
        let network = self.network.lock().take();
        if let Some(network) = network {
            network.stop().await;
        }
        *self.handler.lock() = None;
        tracing::info!("HyQuery disabled");
    }

    fn log_startup_summary(&self) {
        let snapshot = HostSnapshot::capture(self.host.as_ref());
        tracing::info!(
            "HyQuery enabled on UDP port {} - server name: {}",
            snapshot.bind_port,
            snapshot.server_name
        );

        let motd = self
            .config
            .custom_motd_override()
            .unwrap_or_else(|| snapshot.motd.clone());
        tracing::info!(
            "  - MOTD: {} {}",
            if motd.is_empty() { "(empty)" } else { motd.as_str() },
            if self.config.use_custom_motd {
                "(custom)"
            } else {
                "(server config)"
            }
        );
        tracing::info!("  - max players: {}", snapshot.max_players);
        tracing::info!("  - show player list: {}", self.config.show_player_list);
        tracing::info!("  - show plugins: {}", self.config.show_plugins);
        tracing::info!("  - V1 enabled: {}", self.config.v1_enabled);
        tracing::info!("  - V2 enabled: {}", self.config.v2_enabled);
        if self.config.v2_enabled {
            tracing::info!(
                "  - V2 challenge validity: {}s",
                self.config.challenge_token_validity_seconds
            );
            let auth = self.config.resolved_auth();
            tracing::info!(
                "  - V2 public access: basic={}, players={}",
                auth.public_access.basic,
                auth.public_access.players
            );
            tracing::info!("  - V2 auth tokens: {}", auth.tokens.len());
        }
        if self.config.network.is_primary() {
            tracing::info!("  - network mode: PRIMARY");
        } else if self.config.network.is_worker() {
            tracing::info!("  - network mode: WORKER");
        }
    }
}
