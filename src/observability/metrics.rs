//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): dispatched calls by strategy, outcome
//! - `proxy_request_duration_seconds` (histogram): call latency by strategy
//! - `proxy_retries_total` (counter): re-attempts by server
//! - `proxy_breaker_transitions_total` (counter): breaker state changes
//! - `proxy_in_flight_requests` (gauge): tracked in-flight requests
//! - `proxy_server_reachable` (gauge): 1=reachable, 0=unreachable
//!
//! Without an installed recorder every call here is a no-op.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

/// Install the Prometheus recorder and its HTTP scrape listener.
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint started"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a completed dispatch.
pub fn record_request(strategy: &'static str, outcome: &'static str, elapsed: Duration) {
    counter!("proxy_requests_total", "strategy" => strategy, "outcome" => outcome).increment(1);
    histogram!("proxy_request_duration_seconds", "strategy" => strategy)
        .record(elapsed.as_secs_f64());
}

pub fn record_retry(server_id: &str) {
    counter!("proxy_retries_total", "server" => server_id.to_string()).increment(1);
}

pub fn record_breaker_transition(server_id: &str, state: &'static str) {
    counter!(
        "proxy_breaker_transitions_total",
        "server" => server_id.to_string(),
        "state" => state
    )
    .increment(1);
}

pub fn record_in_flight(count: usize) {
    gauge!("proxy_in_flight_requests").set(count as f64);
}

pub fn record_server_reachable(server_id: &str, reachable: bool) {
    gauge!("proxy_server_reachable", "server" => server_id.to_string())
        .set(if reachable { 1.0 } else { 0.0 });
}
