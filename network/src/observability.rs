//! Bounded-level logging and counters for the network coordinators.
//!
//! The configured level filters on top of whatever global `tracing`
//! subscriber the host installed, so operators can quiet the coordinator
//! without touching the rest of the process. Counters are plain atomics and
//! become no-ops when metrics are disabled.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::ObservabilityConfig;

/// Coordinator log verbosity, most severe first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    pub fn from_config(raw: &str) -> Self {
        match raw.to_lowercase().as_str() {
            "error" => Self::Error,
            "warn" => Self::Warn,
            "debug" => Self::Debug,
            _ => Self::Info,
        }
    }

    fn allows(self, desired: LogLevel) -> bool {
        desired <= self
    }
}

/// How much detail `metrics_summary` includes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetricsDetail {
    Basic,
    Detailed,
}

impl MetricsDetail {
    pub fn from_config(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("detailed") {
            Self::Detailed
        } else {
            Self::Basic
        }
    }
}

/// Shared observability helper used by both coordinators and the manager.
pub struct NetworkObservability {
    level: LogLevel,
    metrics_enabled: bool,
    metrics_detail: MetricsDetail,

    publish_attempts: AtomicU64,
    publish_success: AtomicU64,
    publish_failures: AtomicU64,

    read_attempts: AtomicU64,
    read_success: AtomicU64,
    read_failures: AtomicU64,

    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    stale_evictions: AtomicU64,
    snapshots_read: AtomicU64,

    total_read_latency_millis: AtomicU64,
    total_publish_latency_millis: AtomicU64,

    status_accepted: AtomicU64,
    status_rejected: AtomicU64,
}

impl NetworkObservability {
    pub fn new(config: &ObservabilityConfig) -> Self {
        Self {
            level: LogLevel::from_config(&config.log_level),
            metrics_enabled: config.metrics_enabled,
            metrics_detail: MetricsDetail::from_config(&config.metrics_detail),
            publish_attempts: AtomicU64::new(0),
            publish_success: AtomicU64::new(0),
            publish_failures: AtomicU64::new(0),
            read_attempts: AtomicU64::new(0),
            read_success: AtomicU64::new(0),
            read_failures: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            stale_evictions: AtomicU64::new(0),
            snapshots_read: AtomicU64::new(0),
            total_read_latency_millis: AtomicU64::new(0),
            total_publish_latency_millis: AtomicU64::new(0),
            status_accepted: AtomicU64::new(0),
            status_rejected: AtomicU64::new(0),
        }
    }

    pub fn metrics_enabled(&self) -> bool {
        self.metrics_enabled
    }

    pub fn debug(&self, msg: &str) {
        if self.level.allows(LogLevel::Debug) {
            tracing::debug!(target: "hyquery::network", "{msg}");
        }
    }

    pub fn info(&self, msg: &str) {
        if self.level.allows(LogLevel::Info) {
            tracing::info!(target: "hyquery::network", "{msg}");
        }
    }

    pub fn warn(&self, msg: &str) {
        if self.level.allows(LogLevel::Warn) {
            tracing::warn!(target: "hyquery::network", "{msg}");
        }
    }

    pub fn error(&self, msg: &str) {
        if self.level.allows(LogLevel::Error) {
            tracing::error!(target: "hyquery::network", "{msg}");
        }
    }

    pub fn record_publish_attempt(&self) {
        self.increment(&self.publish_attempts);
    }

    pub fn record_publish_success(&self, latency_millis: u64) {
        self.increment(&self.publish_success);
        self.add(&self.total_publish_latency_millis, latency_millis);
    }

    pub fn record_publish_failure(&self) {
        self.increment(&self.publish_failures);
    }

    pub fn record_read_attempt(&self) {
        self.increment(&self.read_attempts);
    }

    pub fn record_read_success(&self, snapshot_count: u64, latency_millis: u64) {
        self.increment(&self.read_success);
        self.add(&self.snapshots_read, snapshot_count);
        self.add(&self.total_read_latency_millis, latency_millis);
    }

    pub fn record_read_failure(&self) {
        self.increment(&self.read_failures);
    }

    pub fn record_cache_hit(&self) {
        self.increment(&self.cache_hits);
    }

    pub fn record_cache_miss(&self) {
        self.increment(&self.cache_misses);
    }

    pub fn record_stale_evictions(&self, count: u64) {
        self.add(&self.stale_evictions, count);
    }

    pub fn record_status_accepted(&self) {
        self.increment(&self.status_accepted);
    }

    pub fn record_status_rejected(&self) {
        self.increment(&self.status_rejected);
    }

    /// One-line counter summary, logged periodically and at shutdown.
    pub fn metrics_summary(&self) -> String {
        if !self.metrics_enabled {
            return "metrics=disabled".to_string();
        }

        let mut summary = format!(
            "publishes={}/{} publishFailures={} reads={}/{} readFailures={} \
             cacheHits={} cacheMisses={} staleEvictions={} snapshotsRead={} \
             statusAccepted={} statusRejected={}",
            self.publish_success.load(Ordering::Relaxed),
            self.publish_attempts.load(Ordering::Relaxed),
            self.publish_failures.load(Ordering::Relaxed),
            self.read_success.load(Ordering::Relaxed),
            self.read_attempts.load(Ordering::Relaxed),
            self.read_failures.load(Ordering::Relaxed),
            self.cache_hits.load(Ordering::Relaxed),
            self.cache_misses.load(Ordering::Relaxed),
            self.stale_evictions.load(Ordering::Relaxed),
            self.snapshots_read.load(Ordering::Relaxed),
            self.status_accepted.load(Ordering::Relaxed),
            self.status_rejected.load(Ordering::Relaxed),
        );

        if self.metrics_detail == MetricsDetail::Detailed {
            let read_success = self.read_success.load(Ordering::Relaxed).max(1);
            let publish_success = self.publish_success.load(Ordering::Relaxed).max(1);
            summary.push_str(&format!(
                " avgReadLatencyMs={} avgPublishLatencyMs={}",
                self.total_read_latency_millis.load(Ordering::Relaxed) / read_success,
                self.total_publish_latency_millis.load(Ordering::Relaxed) / publish_success,
            ));
        }

        summary
    }

    fn increment(&self, counter: &AtomicU64) {
        if self.metrics_enabled {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn add(&self, counter: &AtomicU64, value: u64) {
        if self.metrics_enabled {
            counter.fetch_add(value, Ordering::Relaxed);
        }
    }
}
