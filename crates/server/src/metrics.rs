//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the hibiki server:
//! - HTTP request metrics (latency, counts, errors)
//! - WebSocket connection metrics
//! - Generation run and job status (collected dynamically from the ledger)

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry, TextEncoder,
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
            "hibiki_http_request_duration_seconds",
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
        Opts::new("hibiki_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "hibiki_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

/// Authentication failures.
pub static AUTH_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("hibiki_auth_failures_total", "Total authentication failures"),
        &["reason"],
    )
    .unwrap()
});

// =============================================================================
// WebSocket Metrics
// =============================================================================

/// Active WebSocket connections.
pub static WS_CONNECTIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "hibiki_ws_connections_active",
        "Number of active WebSocket connections",
    )
    .unwrap()
});

/// Total WebSocket connections (cumulative).
pub static WS_CONNECTIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "hibiki_ws_connections_total",
        "Total WebSocket connections since startup",
    )
    .unwrap()
});

/// WebSocket messages sent by event type.
pub static WS_MESSAGES_SENT: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("hibiki_ws_messages_sent_total", "WebSocket messages sent"),
        &["type"],
    )
    .unwrap()
});

/// WebSocket lag events (when a client falls behind).
pub static WS_LAG_EVENTS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "hibiki_ws_lag_events_total",
        "WebSocket lag events (client fell behind)",
    )
    .unwrap()
});

// =============================================================================
// Run / Job Metrics
// =============================================================================

/// Jobs by current status (collected dynamically from the ledger).
pub static JOBS_BY_STATUS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("hibiki_jobs_by_status", "Current job count by status"),
        &["status"],
    )
    .unwrap()
});

/// Whether a generation run is active (1) or not (0).
pub static RUN_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "hibiki_run_active",
        "Whether a generation run is active (1) or idle (0)",
    )
    .unwrap()
});

/// Generation runs started since startup.
pub static RUNS_STARTED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "hibiki_runs_started_total",
        "Total generation runs started since startup",
    )
    .unwrap()
});

/// Jobs queued for regeneration since startup.
pub static JOBS_REGENERATED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "hibiki_jobs_regenerated_total",
        "Total jobs queued for regeneration since startup",
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
    registry
        .register(Box::new(AUTH_FAILURES_TOTAL.clone()))
        .unwrap();

    // WebSocket
    registry
        .register(Box::new(WS_CONNECTIONS_ACTIVE.clone()))
        .unwrap();
    registry
        .register(Box::new(WS_CONNECTIONS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(WS_MESSAGES_SENT.clone()))
        .unwrap();
    registry.register(Box::new(WS_LAG_EVENTS.clone())).unwrap();

    // Runs / jobs
    registry
        .register(Box::new(JOBS_BY_STATUS.clone()))
        .unwrap();
    registry.register(Box::new(RUN_ACTIVE.clone())).unwrap();
    registry
        .register(Box::new(RUNS_STARTED_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(JOBS_REGENERATED_TOTAL.clone()))
        .unwrap();
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
/// Called before encoding so the gauges reflect the live ledger rather than
/// the last mutation the server happened to observe.
pub async fn collect_dynamic_metrics(state: &crate::state::AppState) {
    if let Ok(status) = state.orchestrator().status().await {
        RUN_ACTIVE.set(if status.running { 1 } else { 0 });
        JOBS_BY_STATUS
            .with_label_values(&["pending"])
            .set(status.run.pending as i64);
        JOBS_BY_STATUS
            .with_label_values(&["generating"])
            .set(status.run.generating as i64);
        JOBS_BY_STATUS
            .with_label_values(&["completed"])
            .set(status.run.completed as i64);
        JOBS_BY_STATUS
            .with_label_values(&["error"])
            .set(status.run.failed as i64);
    }
}

/// Normalize a path for metric labels (replace numeric ids with a placeholder).
pub fn normalize_path(path: &str) -> String {
    let numeric_regex = regex_lite::Regex::new(r"/\d+(/|$)").unwrap();
    numeric_regex.replace_all(path, "/{id}$1").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_numeric() {
        let path = "/api/jobs/42/regenerate";
        assert_eq!(normalize_path(path), "/api/jobs/{id}/regenerate");
    }

    #[test]
    fn test_normalize_path_trailing_numeric() {
        let path = "/api/jobs/42";
        assert_eq!(normalize_path(path), "/api/jobs/{id}");
    }

    #[test]
    fn test_normalize_path_no_ids() {
        let path = "/api/run/status";
        assert_eq!(normalize_path(path), "/api/run/status");
    }

    #[test]
    fn test_encode_metrics_returns_prometheus_format() {
        // Access metrics to ensure they're initialized
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/test", "200"])
            .inc();

        let output = encode_metrics();
        assert!(output.contains("hibiki_http_requests_total"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_registry_contains_all_metrics() {
        // Touch all metrics to ensure they appear in output
        // (Prometheus only outputs metrics that have been accessed)
        HTTP_REQUEST_DURATION
            .with_label_values(&["GET", "/test", "200"])
            .observe(0.1);
        HTTP_REQUESTS_IN_FLIGHT.set(0);
        WS_CONNECTIONS_ACTIVE.set(0);
        WS_CONNECTIONS_TOTAL.inc();
        JOBS_BY_STATUS.with_label_values(&["pending"]).set(0);
        RUN_ACTIVE.set(0);
        RUNS_STARTED_TOTAL.inc();
        JOBS_REGENERATED_TOTAL.inc();

        let output = encode_metrics();

        // HTTP metrics
        assert!(output.contains("hibiki_http_request_duration_seconds"));
        assert!(output.contains("hibiki_http_requests_total"));
        assert!(output.contains("hibiki_http_requests_in_flight"));

        // WebSocket metrics
        assert!(output.contains("hibiki_ws_connections_active"));
        assert!(output.contains("hibiki_ws_connections_total"));

        // Run / job metrics
        assert!(output.contains("hibiki_jobs_by_status"));
        assert!(output.contains("hibiki_run_active"));
        assert!(output.contains("hibiki_runs_started_total"));
        assert!(output.contains("hibiki_jobs_regenerated_total"));
    }
}
