//! Tracing setup and in-process counters

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

/// Filter used until the configuration has been read.
pub const BOOTSTRAP_FILTER: &str = "info";

/// Swaps the active filter once the configuration is known.
pub type FilterHandle = reload::Handle<EnvFilter, Registry>;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise [`BOOTSTRAP_FILTER`] applies until
/// [`apply_log_filter`] installs `telemetry.log_filter`. Returns `None`
/// when a subscriber was already installed.
pub fn init_tracing() -> Option<FilterHandle> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(BOOTSTRAP_FILTER));
    let (filter, handle) = reload::Layer::new(filter);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init()
        .ok()
        .map(|_| handle)
}

/// Switch to the configured filter unless `RUST_LOG` overrides it.
pub fn apply_log_filter(handle: &FilterHandle, filter: &str) {
    if std::env::var_os(EnvFilter::DEFAULT_ENV).is_some() {
        return;
    }
    if let Err(e) = reload_filter(handle, filter) {
        tracing::warn!(filter, error = %e, "Invalid log filter, keeping the current one");
    }
}

fn reload_filter(handle: &FilterHandle, filter: &str) -> Result<(), String> {
    let filter = EnvFilter::try_new(filter).map_err(|e| e.to_string())?;
    handle.reload(filter).map_err(|e| e.to_string())
}

/// Metrics handle for recording counters
#[derive(Debug, Default)]
pub struct Metrics {
    jobs_submitted: AtomicU64,
    jobs_finished: AtomicU64,
    jobs_failed: AtomicU64,
    broadcasts_delivered: AtomicU64,
    subscribers_dropped: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job_submitted(&self) {
        self.jobs_submitted.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "jobs_submitted", "Metric incremented");
    }

    pub fn job_finished(&self) {
        self.jobs_finished.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "jobs_finished", "Metric incremented");
    }

    pub fn job_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "jobs_failed", "Metric incremented");
    }

    pub fn broadcast_delivered(&self, count: usize) {
        self.broadcasts_delivered
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn subscriber_dropped(&self) {
        self.subscribers_dropped.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "subscribers_dropped", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_submitted: self.jobs_submitted.load(Ordering::Relaxed),
            jobs_finished: self.jobs_finished.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            broadcasts_delivered: self.broadcasts_delivered.load(Ordering::Relaxed),
            subscribers_dropped: self.subscribers_dropped.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub jobs_submitted: u64,
    pub jobs_finished: u64,
    pub jobs_failed: u64,
    pub broadcasts_delivered: u64,
    pub subscribers_dropped: u64,
}
