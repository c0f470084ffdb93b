//! Metrics collection and exposition.
//!
//! # Metrics
//! - `ingest_units_received_total` (counter): batches/messages enqueued, by protocol
//! - `ingest_records_total` (counter): records handed to the reader
//! - `ingest_decode_errors_total` (counter): malformed frames dropped
//! - `ingest_handshake_failures_total` (counter): rejected TLS handshakes
//! - `ingest_active_connections` (gauge): open connections
//!
//! # Design Decisions
//! - Recorded through the `metrics` facade; a no-op until an exporter is installed
//! - Every series carries a `protocol` label

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    let builder = PrometheusBuilder::new().with_http_listener(addr);

    match builder.install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics server started"),
        Err(e) => tracing::error!(error = %e, "Failed to install Prometheus recorder"),
    }
}

/// A decoded unit entered the hand-off channel.
pub fn record_unit(protocol: &'static str) {
    metrics::counter!("ingest_units_received_total", "protocol" => protocol).increment(1);
}

/// Records were handed to the reader.
pub fn record_records(protocol: &'static str, count: usize) {
    metrics::counter!("ingest_records_total", "protocol" => protocol).increment(count as u64);
}

/// A malformed frame was dropped.
pub fn record_decode_error(protocol: &'static str) {
    metrics::counter!("ingest_decode_errors_total", "protocol" => protocol).increment(1);
}

/// A TLS handshake failed or timed out.
pub fn record_handshake_failure(protocol: &'static str) {
    metrics::counter!("ingest_handshake_failures_total", "protocol" => protocol).increment(1);
}

/// Current number of open connections.
pub fn set_active_connections(protocol: &'static str, count: u64) {
    metrics::gauge!("ingest_active_connections", "protocol" => protocol).set(count as f64);
}
