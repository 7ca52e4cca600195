//! Metrics collection and exposition.
//!
//! # Metrics
//! - `stagegate_requests_total` (counter): executed requests by method, status
//! - `stagegate_request_duration_seconds` (histogram): pipeline latency
//! - `stagegate_upstream_requests_total` (counter): forwards by backend, status
//! - `stagegate_upstream_up` (gauge): 1=up, 0=down, per backend
//!
//! Recording goes through the `metrics` facade and is a no-op until a
//! recorder is installed with [`init_metrics`].

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with an HTTP scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one request that went through the pipeline.
pub fn record_request(method: &str, status: u16, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
    ];
    metrics::counter!("stagegate_requests_total", &labels).increment(1);
    metrics::histogram!("stagegate_request_duration_seconds", &labels)
        .record(start.elapsed().as_secs_f64());
}

/// Record one upstream forward.
pub fn record_upstream(backend: &str, status: u16) {
    let labels = [
        ("backend", backend.to_string()),
        ("status", status.to_string()),
    ];
    metrics::counter!("stagegate_upstream_requests_total", &labels).increment(1);
}

/// Record the latest liveness probe result for a backend.
pub fn record_upstream_up(backend: &str, up: bool) {
    metrics::gauge!("stagegate_upstream_up", "backend" => backend.to_string())
        .set(if up { 1.0 } else { 0.0 });
}
