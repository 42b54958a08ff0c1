//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the acquisition server:
//! - HTTP request metrics (latency, counts)
//! - Tracked and persisted runs (collected dynamically)
//! - Run, part and build counters from the core crate

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "acquire_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("acquire_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "acquire_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Run Metrics (collected dynamically)
// =============================================================================

/// Runs with a live run loop.
pub static TRACKED_RUNS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "acquire_tracked_runs",
        "Number of runs with a live run loop in this server",
    )
    .unwrap()
});

/// Resumable descriptors in the store.
pub static STORED_DESCRIPTORS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "acquire_stored_descriptors",
        "Number of run descriptors persisted in the store",
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // Runs
    registry.register(Box::new(TRACKED_RUNS.clone())).unwrap();
    registry
        .register(Box::new(STORED_DESCRIPTORS.clone()))
        .unwrap();

    // Core metrics (runs, parts, builds)
    for metric in acquire_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Collect dynamic metrics from current application state.
///
/// Called before encoding so the gauges reflect the server's run map and the
/// descriptor store.
pub async fn collect_dynamic_metrics(state: &crate::state::AppState) {
    TRACKED_RUNS.set(state.active_count().await as i64);

    if let Ok(descriptors) = state.descriptors() {
        STORED_DESCRIPTORS.set(descriptors.len() as i64);
    }
}

/// Normalize a path for metric labels (replace run ids with a placeholder).
pub fn normalize_path(path: &str) -> String {
    let mut previous = "";
    path.split('/')
        .map(|segment| {
            let label = if previous == "runs" && !segment.is_empty() {
                "{id}"
            } else {
                segment
            };
            previous = segment;
            label
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_run_id() {
        let path = "/api/v1/runs/repo%3A%2F%2Fres-1";
        assert_eq!(normalize_path(path), "/api/v1/runs/{id}");
    }

    #[test]
    fn test_normalize_path_run_command() {
        let path = "/api/v1/runs/%2Fdata%2Fpack.zip/pause";
        assert_eq!(normalize_path(path), "/api/v1/runs/{id}/pause");
    }

    #[test]
    fn test_normalize_path_collection() {
        assert_eq!(normalize_path("/api/v1/runs"), "/api/v1/runs");
        assert_eq!(normalize_path("/api/v1/runs/"), "/api/v1/runs/");
    }

    #[test]
    fn test_normalize_path_no_ids() {
        let path = "/api/v1/health";
        assert_eq!(normalize_path(path), "/api/v1/health");
    }

    #[test]
    fn test_encode_metrics_returns_prometheus_format() {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/test", "200"])
            .inc();

        let output = encode_metrics();
        assert!(output.contains("acquire_http_requests_total"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_registry_contains_core_metrics() {
        HTTP_REQUEST_DURATION
            .with_label_values(&["GET", "/test", "200"])
            .observe(0.1);
        TRACKED_RUNS.set(0);
        STORED_DESCRIPTORS.set(0);

        let output = encode_metrics();

        assert!(output.contains("acquire_http_request_duration_seconds"));
        assert!(output.contains("acquire_http_requests_in_flight"));
        assert!(output.contains("acquire_tracked_runs"));
        assert!(output.contains("acquire_stored_descriptors"));
        assert!(output.contains("acquire_runs_started_total"));
        assert!(output.contains("acquire_active_runs"));
    }
}
