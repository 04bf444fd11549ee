//! Aggregation of finalized records into a benchmark summary.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::results::percentile::{percentile, sorted};
use crate::results::record::{FailureKind, RequestRecord, ServerMetrics};

/// Distribution of one metric over a sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Distribution {
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub p50: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

impl Distribution {
    /// `None` for an empty sample.
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        let s = sorted(values);
        let (&min, &max) = (s.first()?, s.last()?);
        Some(Self {
            count: s.len(),
            mean: s.iter().sum::<f64>() / s.len() as f64,
            min,
            max,
            p50: percentile(&s, 50.0)?,
            p90: percentile(&s, 90.0)?,
            p95: percentile(&s, 95.0)?,
            p99: percentile(&s, 99.0)?,
        })
    }
}

/// Derived, read-only view over a finished run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BenchmarkSummary {
    pub total_requests: usize,
    pub successful_requests: usize,
    pub failed_requests: usize,
    pub success_ratio: Option<f64>,
    pub failures_by_kind: BTreeMap<FailureKind, usize>,
    pub enriched_requests: usize,

    /// First dispatch to last completion.
    pub duration_secs: Option<f64>,
    pub request_throughput: Option<f64>,

    pub total_output_units: u64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub output_unit_throughput: Option<f64>,
    pub output_token_throughput: Option<f64>,
    pub total_token_throughput: Option<f64>,

    pub ttft_ms: Option<Distribution>,
    pub tpot_ms: Option<Distribution>,
    pub e2e_latency_ms: Option<Distribution>,
    /// Pooled over every gap of every successful request, so its `count`
    /// is the number of gaps and may exceed the number of requests.
    pub inter_unit_gap_ms: Option<Distribution>,

    pub server_queue_ms: Option<Distribution>,
    pub server_prefill_ms: Option<Distribution>,
    pub server_decode_ms: Option<Distribution>,
    pub server_inference_ms: Option<Distribution>,
    pub server_e2e_ms: Option<Distribution>,
    pub server_ttft_ms: Option<Distribution>,
}

fn as_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

fn server_table(
    records: &[&RequestRecord],
    field: impl Fn(&ServerMetrics) -> Option<f64>,
) -> Option<Distribution> {
    Distribution::from_values(
        records
            .iter()
            .filter_map(|r| r.server.as_ref())
            .filter_map(field),
    )
}

fn per_second(amount: f64, duration: Option<f64>) -> Option<f64> {
    duration.filter(|d| *d > 0.0).map(|d| amount / d)
}

/// Summarize a set of finalized records. Pure; order of `records` is irrelevant.
pub fn summarize(records: &[RequestRecord]) -> BenchmarkSummary {
    let successful: Vec<&RequestRecord> = records.iter().filter(|r| r.success).collect();
    let total = records.len();

    let mut failures_by_kind = BTreeMap::new();
    for kind in records.iter().filter_map(RequestRecord::failure_kind) {
        *failures_by_kind.entry(kind).or_insert(0) += 1;
    }

    let first_dispatch = records.iter().map(|r| r.dispatch_offset).min();
    let last_completion = records.iter().filter_map(|r| r.completion_offset).max();
    let duration_secs = match (first_dispatch, last_completion) {
        (Some(start), Some(end)) => Some(end.saturating_sub(start).as_secs_f64()),
        _ => None,
    };

    let total_output_units: u64 = successful.iter().map(|r| r.events.len() as u64).sum();
    let total_input_tokens: u64 = successful.iter().filter_map(|r| r.prompt_tokens()).sum();
    let total_output_tokens: u64 = successful.iter().filter_map(|r| r.completion_tokens()).sum();

    BenchmarkSummary {
        total_requests: total,
        successful_requests: successful.len(),
        failed_requests: total - successful.len(),
        success_ratio: (total > 0).then(|| successful.len() as f64 / total as f64),
        failures_by_kind,
        enriched_requests: records.iter().filter(|r| r.server.is_some()).count(),

        duration_secs,
        request_throughput: per_second(successful.len() as f64, duration_secs),

        total_output_units,
        total_input_tokens,
        total_output_tokens,
        output_unit_throughput: per_second(total_output_units as f64, duration_secs),
        output_token_throughput: per_second(total_output_tokens as f64, duration_secs),
        total_token_throughput: per_second(
            (total_input_tokens + total_output_tokens) as f64,
            duration_secs,
        ),

        ttft_ms: Distribution::from_values(
            successful.iter().filter_map(|r| r.client.ttft).map(as_ms),
        ),
        tpot_ms: Distribution::from_values(
            successful.iter().filter_map(|r| r.client.tpot).map(as_ms),
        ),
        e2e_latency_ms: Distribution::from_values(
            successful.iter().map(|r| as_ms(r.client.e2e_latency)),
        ),
        inter_unit_gap_ms: Distribution::from_values(
            successful
                .iter()
                .flat_map(|r| r.client.inter_unit_gaps.iter().copied())
                .map(as_ms),
        ),

        server_queue_ms: server_table(&successful, |s| s.queue_ms),
        server_prefill_ms: server_table(&successful, |s| s.prefill_ms),
        server_decode_ms: server_table(&successful, |s| s.decode_ms),
        server_inference_ms: server_table(&successful, |s| s.inference_ms),
        server_e2e_ms: server_table(&successful, |s| s.e2e_ms),
        server_ttft_ms: server_table(&successful, |s| s.ttft_ms),
    }
}

const WIDTH: usize = 50;

fn rule(f: &mut fmt::Formatter<'_>, fill: char) -> fmt::Result {
    writeln!(f, "{}", fill.to_string().repeat(WIDTH))
}

fn heading(f: &mut fmt::Formatter<'_>, title: &str) -> fmt::Result {
    writeln!(f, "{:-^width$}", title, width = WIDTH)
}

fn row(f: &mut fmt::Formatter<'_>, label: &str, value: impl fmt::Display) -> fmt::Result {
    writeln!(f, "{:<41}{}", label, value)
}

fn rate_row(f: &mut fmt::Formatter<'_>, label: &str, value: Option<f64>) -> fmt::Result {
    match value {
        Some(v) => row(f, label, format!("{:.2}", v)),
        None => row(f, label, "n/a"),
    }
}

fn table(
    f: &mut fmt::Formatter<'_>,
    title: &str,
    short: &str,
    dist: &Option<Distribution>,
) -> fmt::Result {
    let Some(d) = dist else {
        return Ok(());
    };
    heading(f, title)?;
    row(f, &format!("Mean {} (ms):", short), format!("{:.2}", d.mean))?;
    row(f, &format!("Median {} (ms):", short), format!("{:.2}", d.p50))?;
    row(f, &format!("P90 {} (ms):", short), format!("{:.2}", d.p90))?;
    row(f, &format!("P99 {} (ms):", short), format!("{:.2}", d.p99))
}

/// Human-readable report.
impl fmt::Display for BenchmarkSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        rule(f, '=')?;
        writeln!(f, "{:^width$}", "Serving Benchmark Result", width = WIDTH)?;
        rule(f, '=')?;
        row(f, "Successful requests:", self.successful_requests)?;
        row(f, "Failed requests:", self.failed_requests)?;
        for (kind, count) in &self.failures_by_kind {
            row(f, &format!("  {}:", kind.as_str()), count)?;
        }
        row(f, "Enriched requests:", self.enriched_requests)?;
        match self.duration_secs {
            Some(d) => row(f, "Benchmark duration (s):", format!("{:.2}", d))?,
            None => row(f, "Benchmark duration (s):", "n/a")?,
        }
        row(f, "Total output units:", self.total_output_units)?;
        row(f, "Total input tokens:", self.total_input_tokens)?;
        row(f, "Total generated tokens:", self.total_output_tokens)?;
        rate_row(f, "Request throughput (req/s):", self.request_throughput)?;
        rate_row(f, "Output unit throughput (unit/s):", self.output_unit_throughput)?;
        rate_row(f, "Output token throughput (tok/s):", self.output_token_throughput)?;
        rate_row(f, "Total token throughput (tok/s):", self.total_token_throughput)?;

        table(f, "Time to First Token", "TTFT", &self.ttft_ms)?;
        table(f, "Time per Output Token (excl. 1st)", "TPOT", &self.tpot_ms)?;
        table(f, "Inter-token Latency", "ITL", &self.inter_unit_gap_ms)?;
        table(f, "End-to-end Latency", "E2EL", &self.e2e_latency_ms)?;
        table(f, "Queue Time", "Queue Time", &self.server_queue_ms)?;
        table(f, "Prefill Time", "Prefill", &self.server_prefill_ms)?;
        table(f, "Decode Time", "Decode", &self.server_decode_ms)?;
        table(f, "Server Inference Time", "Inference", &self.server_inference_ms)?;
        table(f, "Server E2E Latency", "Server E2E", &self.server_e2e_ms)?;
        table(f, "Server TTFT", "Server TTFT", &self.server_ttft_ms)?;
        rule(f, '=')
    }
}
