//! Metrics collection and exposition.
//!
//! # Metrics
//! - `bench_requests_dispatched_total` (counter)
//! - `bench_requests_completed_total` (counter): by outcome (`success` or failure kind)
//! - `bench_requests_in_flight` (gauge)
//! - `bench_ttft_seconds` (histogram)
//! - `bench_inter_unit_gap_seconds` (histogram)
//! - `bench_enrichment_total` (counter): by enrichment status
//!
//! Recording is a no-op until a recorder is installed, so library users and
//! tests pay nothing unless they call [`init_metrics`].

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_dispatch() {
    metrics::counter!("bench_requests_dispatched_total").increment(1);
}

pub fn record_in_flight(count: usize) {
    metrics::gauge!("bench_requests_in_flight").set(count as f64);
}

/// Record a finished request. `outcome` is `success` or a failure kind.
pub fn record_completion(outcome: &'static str, ttft: Option<Duration>, gaps: &[Duration]) {
    metrics::counter!("bench_requests_completed_total", "outcome" => outcome).increment(1);
    if let Some(ttft) = ttft {
        metrics::histogram!("bench_ttft_seconds").record(ttft.as_secs_f64());
    }
    let histogram = metrics::histogram!("bench_inter_unit_gap_seconds");
    for gap in gaps {
        histogram.record(gap.as_secs_f64());
    }
}

pub fn record_enrichment(status: &'static str) {
    metrics::counter!("bench_enrichment_total", "status" => status).increment(1);
}
