//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Run lifecycle (started, finished by status, currently active)
//! - Download phase (parts downloaded)
//! - Build phase (builds by result)

use once_cell::sync::Lazy;
use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};

/// Registry holding every core metric.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    for collector in all_metrics() {
        registry.register(collector).unwrap();
    }
    registry
});

// =============================================================================
// Run Metrics
// =============================================================================

/// Runs started.
pub static RUNS_STARTED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("acquire_runs_started_total", "Total runs started").unwrap()
});

/// Runs finished by terminal status.
pub static RUNS_FINISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("acquire_runs_finished_total", "Total runs finished"),
        &["status"], // "complete", "error", "cancelled"
    )
    .unwrap()
});

/// Run loops currently alive.
pub static ACTIVE_RUNS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("acquire_active_runs", "Number of run loops currently alive").unwrap()
});

// =============================================================================
// Phase Metrics
// =============================================================================

/// Parts downloaded.
pub static PARTS_DOWNLOADED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "acquire_parts_downloaded_total",
        "Total remote parts downloaded",
    )
    .unwrap()
});

/// Builds by result.
pub static BUILDS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("acquire_builds_total", "Total builds finished"),
        &["result"], // "complete", "failed"
    )
    .unwrap()
});

/// All core metrics, for registration.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(RUNS_STARTED.clone()),
        Box::new(RUNS_FINISHED.clone()),
        Box::new(ACTIVE_RUNS.clone()),
        Box::new(PARTS_DOWNLOADED.clone()),
        Box::new(BUILDS_TOTAL.clone()),
    ]
}
