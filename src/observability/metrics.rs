//! Metrics collection and exposition.
//!
//! # Metrics
//! - `microserve_dispatch_total` (counter): controller calls by controller, outcome
//! - `microserve_dispatch_duration_seconds` (histogram): controller call latency
//! - `microserve_proxy_requests_total` (counter): proxied requests by route, status
//! - `microserve_proxy_duration_seconds` (histogram): upstream round-trip latency
//! - `microserve_in_flight_requests` (gauge): dispatched calls currently running
//!
//! Without an installed recorder every call is a no-op.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_dispatch(controller: &str, outcome: &'static str, start: Instant) {
    let controller = controller.to_string();
    counter!("microserve_dispatch_total", "controller" => controller.clone(), "outcome" => outcome)
        .increment(1);
    histogram!("microserve_dispatch_duration_seconds", "controller" => controller, "outcome" => outcome)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_proxy(route: &str, status: u16, start: Instant) {
    let route = route.to_string();
    let status = status.to_string();
    counter!("microserve_proxy_requests_total", "route" => route.clone(), "status" => status.clone())
        .increment(1);
    histogram!("microserve_proxy_duration_seconds", "route" => route, "status" => status)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_in_flight(current: usize) {
    gauge!("microserve_in_flight_requests").set(current as f64);
}
