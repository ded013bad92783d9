//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_calls_total` (counter): orchestrated calls by dependency, outcome
//! - `gateway_call_duration_seconds` (histogram): latency including retries
//! - `gateway_retries_total` (counter): scheduled retries by dependency
//! - `gateway_rate_limited_total` (counter): limiter rejections by dependency
//! - `gateway_circuit_open` (gauge): 1=open, 0=closed
//! - `gateway_bulkhead_in_use` (gauge): permits currently held
//! - `gateway_compensations_total` (counter): compensation runs by result
//! - `gateway_requests_total` (counter): inbound HTTP requests by route, status

use std::net::SocketAddr;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::time::Instant;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_call(dependency: &str, outcome: &'static str, start: Instant) {
    counter!(
        "gateway_calls_total",
        "dependency" => dependency.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    histogram!("gateway_call_duration_seconds", "dependency" => dependency.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_retry(dependency: &str) {
    counter!("gateway_retries_total", "dependency" => dependency.to_string()).increment(1);
}

pub fn record_rate_limited(dependency: &str) {
    counter!("gateway_rate_limited_total", "dependency" => dependency.to_string()).increment(1);
}

pub fn record_circuit_state(dependency: &str, open: bool) {
    gauge!("gateway_circuit_open", "dependency" => dependency.to_string())
        .set(if open { 1.0 } else { 0.0 });
}

pub fn record_bulkhead_in_use(dependency: &str, in_use: usize) {
    gauge!("gateway_bulkhead_in_use", "dependency" => dependency.to_string()).set(in_use as f64);
}

pub fn record_compensation(dependency: &str, result: &'static str) {
    counter!(
        "gateway_compensations_total",
        "dependency" => dependency.to_string(),
        "result" => result
    )
    .increment(1);
}

pub fn record_request(route: &str, status: u16, start: Instant) {
    counter!(
        "gateway_requests_total",
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("gateway_request_duration_seconds", "route" => route.to_string())
        .record(start.elapsed().as_secs_f64());
}
