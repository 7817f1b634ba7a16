//! Self-metrics and their Prometheus exposition.
//!
//! # Metrics
//! - `pulse_http_requests_total` (counter): requests by method, route, status
//! - `pulse_http_request_duration_seconds` (histogram): request latency by route
//! - `pulse_ingested_total` (counter): accepted records by kind
//! - `pulse_query_duration_seconds` (histogram): store query latency by kind
//! - `pulse_stream_connections` (gauge): open stream connections by kind
//! - `pulse_stream_records_total` (counter): records pushed to streams by kind
//!
//! Recording is a no-op until `init_metrics` installs the exporter.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::stream::StreamKind;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, route: &str, status: u16, start: Instant) {
    counter!(
        "pulse_http_requests_total",
        "method" => method.to_string(),
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("pulse_http_request_duration_seconds", "route" => route.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_ingested(kind: &'static str, count: usize) {
    counter!("pulse_ingested_total", "kind" => kind).increment(count as u64);
}

pub fn record_query(kind: &'static str, start: Instant) {
    histogram!("pulse_query_duration_seconds", "kind" => kind).record(start.elapsed().as_secs_f64());
}

pub fn record_stream_opened(kind: StreamKind) {
    gauge!("pulse_stream_connections", "kind" => kind.as_str()).increment(1.0);
}

pub fn record_stream_closed(kind: StreamKind) {
    gauge!("pulse_stream_connections", "kind" => kind.as_str()).decrement(1.0);
}

pub fn record_stream_batch(kind: StreamKind, records: usize) {
    counter!("pulse_stream_records_total", "kind" => kind.as_str()).increment(records as u64);
}
