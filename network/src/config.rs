//! Network-mode configuration: roles, coordinator selection, worker
//! authorization, shared-store connection settings, and observability.
//!
//! Parsing is permissive: every field carries a default so that configs
//! written by older versions load cleanly. `normalized()` lowercases the
//! enum-like strings, falling back to defaults on unknown values.

use serde::{Deserialize, Serialize};

use hyquery_types::WorkerEntry;

pub const ROLE_PRIMARY: &str = "primary";
pub const ROLE_WORKER: &str = "worker";

pub const COORDINATOR_UDP: &str = "udp";
pub const COORDINATOR_REDIS: &str = "redis";

const DEFAULT_NAMESPACE: &str = "default";
const GLOBAL_NAMESPACE: &str = "global";

/// A primary server a worker pushes status updates to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryTarget {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
}

impl std::fmt::Display for PrimaryTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Multi-server network configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    #[serde(default)]
    pub enabled: bool,

    /// `primary` aggregates fleet state; `worker` publishes its own.
    #[serde(default = "default_role")]
    pub role: String,

    /// `udp` (push to primaries) or `redis` (shared store).
    #[serde(default = "default_coordinator")]
    pub coordinator: String,

    /// Store key namespace this server publishes under / reads from.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Whether primaries additionally read the `global` namespace.
    #[serde(default)]
    pub include_global_namespace: bool,

    /// Seconds after which a store snapshot is hidden and evicted.
    #[serde(default = "default_stale_after")]
    pub stale_after_seconds: u32,

    /// Whether to log each accepted status update / published snapshot.
    #[serde(default)]
    pub log_status_updates: bool,

    /// (Primary) Seconds without an update before a worker counts as offline.
    #[serde(default = "default_worker_timeout")]
    pub worker_timeout_seconds: u32,

    /// (Primary) Authorized workers; ids may end in `*`.
    #[serde(default)]
    pub workers: Vec<WorkerEntry>,

    /// (Worker) This worker's identifier.
    #[serde(default = "default_worker_id")]
    pub id: String,

    /// (Worker) Shared HMAC secret.
    #[serde(default = "default_worker_key")]
    pub key: String,

    /// (Worker) Legacy single primary host; superseded by `primaries`.
    #[serde(default = "default_primary_host")]
    pub primary_host: String,

    /// (Worker) Legacy single primary port; superseded by `primaries`.
    #[serde(default = "default_primary_port")]
    pub primary_port: u16,

    /// (Worker) Hub clustering: every primary to push updates to. Takes
    /// precedence over the legacy pair when non-empty.
    #[serde(default)]
    pub primaries: Vec<PrimaryTarget>,

    /// (Worker) Seconds between status updates.
    #[serde(default = "default_update_interval")]
    pub update_interval_seconds: u32,

    /// Shared-store connection settings.
    #[serde(default)]
    pub redis: StoreConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Shared-store (Redis-compatible) connection settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    #[serde(default = "default_store_host")]
    pub host: String,
    #[serde(default = "default_store_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub database: u32,
    #[serde(default)]
    pub tls: bool,
    #[serde(default = "default_store_timeout")]
    pub connect_timeout_millis: u32,
    #[serde(default = "default_store_timeout")]
    pub read_timeout_millis: u32,
    #[serde(default = "default_publish_interval")]
    pub publish_interval_seconds: u32,
    /// Accepted for forward compatibility but ignored: store mode always
    /// fails closed. Loading `false` logs a warning.
    #[serde(default = "default_true")]
    pub require_available: bool,
}

/// Network coordinator observability controls.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
    #[serde(default = "default_metrics_detail")]
    pub metrics_detail: String,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_role() -> String {
    ROLE_WORKER.to_string()
}

fn default_coordinator() -> String {
    COORDINATOR_UDP.to_string()
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn default_stale_after() -> u32 {
    30
}

fn default_worker_timeout() -> u32 {
    30
}

fn default_worker_id() -> String {
    "server-1".to_string()
}

fn default_worker_key() -> String {
    "change-me-secret".to_string()
}

fn default_primary_host() -> String {
    "localhost".to_string()
}

fn default_primary_port() -> u16 {
    5520
}

fn default_update_interval() -> u32 {
    5
}

fn default_store_host() -> String {
    "localhost".to_string()
}

fn default_store_port() -> u16 {
    6379
}

fn default_store_timeout() -> u32 {
    1000
}

fn default_publish_interval() -> u32 {
    5
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_detail() -> String {
    "basic".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            role: default_role(),
            coordinator: default_coordinator(),
            namespace: default_namespace(),
            include_global_namespace: false,
            stale_after_seconds: default_stale_after(),
            log_status_updates: false,
            worker_timeout_seconds: default_worker_timeout(),
            workers: Vec::new(),
            id: default_worker_id(),
            key: default_worker_key(),
            primary_host: default_primary_host(),
            primary_port: default_primary_port(),
            primaries: Vec::new(),
            update_interval_seconds: default_update_interval(),
            redis: StoreConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: default_store_host(),
            port: default_store_port(),
            username: String::new(),
            password: String::new(),
            database: 0,
            tls: false,
            connect_timeout_millis: default_store_timeout(),
            read_timeout_millis: default_store_timeout(),
            publish_interval_seconds: default_publish_interval(),
            require_available: true,
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            metrics_enabled: true,
            metrics_detail: default_metrics_detail(),
        }
    }
}

impl NetworkConfig {
    pub fn is_primary(&self) -> bool {
        self.enabled && self.role == ROLE_PRIMARY
    }

    pub fn is_worker(&self) -> bool {
        self.enabled && self.role == ROLE_WORKER
    }

    pub fn is_redis_coordinator(&self) -> bool {
        self.coordinator == COORDINATOR_REDIS
    }

    /// All primaries this worker pushes to: the `primaries` list when
    /// non-empty, otherwise the legacy single target.
    pub fn primary_targets(&self) -> Vec<PrimaryTarget> {
        if !self.primaries.is_empty() {
            return self.primaries.clone();
        }
        if !self.primary_host.is_empty() && self.primary_port > 0 {
            return vec![PrimaryTarget {
                host: self.primary_host.clone(),
                port: self.primary_port,
            }];
        }
        Vec::new()
    }

    /// The namespace this server publishes under (blank falls back to the
    /// default namespace).
    pub fn publish_namespace(&self) -> String {
        normalized_namespace(&self.namespace)
    }

    /// Namespaces a primary reads: its own, plus `global` when enabled.
    pub fn read_namespaces(&self) -> Vec<String> {
        let own = self.publish_namespace();
        let mut namespaces = vec![own.clone()];
        if self.include_global_namespace && own != GLOBAL_NAMESPACE {
            namespaces.push(GLOBAL_NAMESPACE.to_string());
        }
        namespaces
    }

    /// Lowercase the enum-like fields, falling back to defaults on unknown
    /// values, and clamp non-positive intervals to their defaults.
    pub fn normalized(mut self) -> Self {
        self.role = match self.role.to_lowercase().as_str() {
            ROLE_PRIMARY => ROLE_PRIMARY.to_string(),
            ROLE_WORKER => ROLE_WORKER.to_string(),
            _ => default_role(),
        };
        self.coordinator = match self.coordinator.to_lowercase().as_str() {
            COORDINATOR_REDIS => COORDINATOR_REDIS.to_string(),
            _ => default_coordinator(),
        };
        self.namespace = normalized_namespace(&self.namespace);
        if self.stale_after_seconds == 0 {
            self.stale_after_seconds = default_stale_after();
        }
        if self.worker_timeout_seconds == 0 {
            self.worker_timeout_seconds = default_worker_timeout();
        }
        if self.update_interval_seconds == 0 {
            self.update_interval_seconds = default_update_interval();
        }
        self.redis = self.redis.normalized();
        self.observability = self.observability.normalized();
        self
    }
}

impl StoreConfig {
    fn normalized(mut self) -> Self {
        if self.port == 0 {
            self.port = default_store_port();
        }
        if self.connect_timeout_millis == 0 {
            self.connect_timeout_millis = default_store_timeout();
        }
        if self.read_timeout_millis == 0 {
            self.read_timeout_millis = default_store_timeout();
        }
        if self.publish_interval_seconds == 0 {
            self.publish_interval_seconds = default_publish_interval();
        }
        self
    }
}

impl ObservabilityConfig {
    fn normalized(mut self) -> Self {
        self.log_level = match self.log_level.to_lowercase().as_str() {
            level @ ("error" | "warn" | "info" | "debug") => level.to_string(),
            _ => default_log_level(),
        };
        self.metrics_detail = match self.metrics_detail.to_lowercase().as_str() {
            detail @ ("basic" | "detailed") => detail.to_string(),
            _ => default_metrics_detail(),
        };
        self
    }
}

fn normalized_namespace(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        DEFAULT_NAMESPACE.to_string()
    } else {
        trimmed.to_string()
    }
}
