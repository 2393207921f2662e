//! Tracing setup and service counters

use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::EnvFilter;

use crate::config::TelemetryConfig;

/// Install the global fmt subscriber. `RUST_LOG` wins over the configured
/// filter. Later calls are no-ops.
pub fn init_tracing(config: &TelemetryConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(config.ansi)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Metrics handle for recording counters
#[derive(Debug, Default)]
pub struct Metrics {
    scans_started: AtomicU64,
    scans_completed: AtomicU64,
    rescans_coalesced: AtomicU64,
    defaults_changed: AtomicU64,
    assignments_failed: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scan_started(&self) {
        self.scans_started.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "scans_started", "Metric incremented");
    }

    pub fn scan_completed(&self) {
        self.scans_completed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "scans_completed", "Metric incremented");
    }

    pub fn rescan_coalesced(&self) {
        self.rescans_coalesced.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "rescans_coalesced", "Metric incremented");
    }

    pub fn default_changed(&self) {
        self.defaults_changed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "defaults_changed", "Metric incremented");
    }

    pub fn assignment_failed(&self) {
        self.assignments_failed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "assignments_failed", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            scans_started: self.scans_started.load(Ordering::Relaxed),
            scans_completed: self.scans_completed.load(Ordering::Relaxed),
            rescans_coalesced: self.rescans_coalesced.load(Ordering::Relaxed),
            defaults_changed: self.defaults_changed.load(Ordering::Relaxed),
            assignments_failed: self.assignments_failed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub scans_started: u64,
    pub scans_completed: u64,
    pub rescans_coalesced: u64,
    pub defaults_changed: u64,
    pub assignments_failed: u64,
}
