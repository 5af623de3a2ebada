//! Metrics collection and exposition.
//!
//! # Metrics
//! - `balancer_requests_total` (counter): finished requests by status, backend
//! - `balancer_request_duration_seconds` (histogram): latency distribution
//! - `balancer_upstream_retries_total` (counter): resubmissions by backend
//! - `balancer_failovers_total` (counter): backends abandoned mid-request
//! - `balancer_backend_alive` (gauge): 1=alive, 0=dead
//!
//! Without an installed recorder every call here is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_request(status: u16, backend: &str, start: Instant) {
    counter!(
        "balancer_requests_total",
        "status" => status.to_string(),
        "backend" => backend.to_string()
    )
    .increment(1);
    histogram!("balancer_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_retry(backend: &str) {
    counter!("balancer_upstream_retries_total", "backend" => backend.to_string()).increment(1);
}

pub fn record_failover(backend: &str) {
    counter!("balancer_failovers_total", "backend" => backend.to_string()).increment(1);
}

pub fn record_backend_alive(backend: &str, alive: bool) {
    gauge!("balancer_backend_alive", "backend" => backend.to_string())
        .set(if alive { 1.0 } else { 0.0 });
}
