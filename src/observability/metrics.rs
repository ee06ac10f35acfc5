//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_forwarded_requests_total` (counter): forwards by method, upstream status
//! - `relay_forward_duration_seconds` (histogram): upstream latency to headers
//! - `relay_forward_errors_total` (counter): transport failures
//! - `relay_recovered_panics_total` (counter): panics turned into 500s
//! - `relay_identity_tokens_total` (counter): token mints by outcome

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_forward(method: &str, status: u16, start: Instant) {
    counter!(
        "relay_forwarded_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("relay_forward_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_forward_error(method: &str) {
    counter!("relay_forward_errors_total", "method" => method.to_string()).increment(1);
}

pub fn record_recovered_panic() {
    counter!("relay_recovered_panics_total").increment(1);
}

pub fn record_identity_token(success: bool) {
    let outcome = if success { "minted" } else { "failed" };
    counter!("relay_identity_tokens_total", "outcome" => outcome).increment(1);
}
