//! Metrics collection and exposition.
//!
//! # Metrics
//! - `http_tracking_calls_total` (counter): tracked calls by status code
//! - `http_tracking_call_duration_seconds` (histogram): call duration
//! - `http_tracking_recorded_bytes_total` (counter): body bytes observed, by direction
//! - `http_tracking_store_failures_total` (counter): rejected record submissions
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - The Prometheus exporter is installed only when enabled in config

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a finished call.
pub fn record_call(status: u16, duration: Duration) {
    counter!("http_tracking_calls_total", "status" => status.to_string()).increment(1);
    histogram!("http_tracking_call_duration_seconds").record(duration.as_secs_f64());
}

/// Record body bytes observed in one direction ("request" or "response").
pub fn record_captured_bytes(direction: &'static str, bytes: u64) {
    counter!("http_tracking_recorded_bytes_total", "direction" => direction).increment(bytes);
}

/// Record a store submission failure.
pub fn record_store_failure() {
    counter!("http_tracking_store_failures_total").increment(1);
}
