//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define proxy metrics (requests, latency, breaker state)
//! - Expose Prometheus-compatible metrics endpoint
//! - Track per-backend and aggregate metrics
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by method, status, backend
//! - `proxy_request_duration_seconds` (histogram): end-to-end latency
//! - `proxy_backend_duration_seconds` (histogram): backend call latency
//! - `proxy_breaker_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `proxy_breaker_rejections_total` (counter): fail-fast rejections
//!
//! # Design Decisions
//! - Recording without an installed exporter is a no-op
//! - Labels for backend, method, status code

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::resilience::CircuitStatus;

/// Install the Prometheus exporter with an HTTP scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_request(method: &str, status: u16, backend: &str, elapsed: Duration) {
    counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "backend" => backend.to_string()
    )
    .increment(1);
    histogram!("proxy_request_duration_seconds", "backend" => backend.to_string())
        .record(elapsed.as_secs_f64());
}

pub fn record_backend_latency(backend: &str, elapsed: Duration) {
    histogram!("proxy_backend_duration_seconds", "backend" => backend.to_string())
        .record(elapsed.as_secs_f64());
}

pub fn record_breaker_state(backend: &str, status: CircuitStatus) {
    gauge!("proxy_breaker_state", "backend" => backend.to_string()).set(status.as_gauge());
}

pub fn record_breaker_rejection(backend: &str) {
    counter!("proxy_breaker_rejections_total", "backend" => backend.to_string()).increment(1);
}
