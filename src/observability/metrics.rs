//! Metrics collection and exposition.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Initialize metrics exporter and server.
pub fn init_metrics(addr: SocketAddr) {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus recorder");

    tracing::info!("Metrics server listening on http://{}", addr);
}

/// Record one reply line by status (OK, NOT_FOUND, BUSY, TIMEOUT, ERROR).
pub fn record_reply(status: &str) {
    counter!("router_replies_total", "status" => status.to_string()).increment(1);
}

/// Record a finished transaction's wall time.
pub fn record_transaction(status: &str, started: Instant) {
    histogram!("router_transaction_seconds", "status" => status.to_string())
        .record(started.elapsed().as_secs_f64());
}

/// Update the in-flight transaction gauge.
pub fn record_inflight(pending: usize) {
    gauge!("router_inflight_transactions").set(pending as f64);
}

/// Update the open-connection gauge.
pub fn record_connections(open: usize) {
    gauge!("router_open_connections").set(open as f64);
}
