//! Per-request record: the central entity of a run.
//!
//! # Lifecycle
//! ```text
//! dispatched()              created by the dispatcher at the dispatch instant
//!   → complete()            once, by the request task when the stream ends or fails
//!   → attach_server_metrics once at most, by the correlator
//!   → read-only             handed to the aggregator
//! ```
//!
//! Durations are kept as `Duration` in memory and serialized as fractional
//! milliseconds (`*_ms` fields).

use std::time::Duration;

use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

use crate::correlation::context::TraceContext;
use crate::inference::error::RequestError;
use crate::inference::request::RequestSpec;

fn ms<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(value.as_secs_f64() * 1000.0)
}

fn opt_ms<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(d) => ms(d, serializer),
        None => serializer.serialize_none(),
    }
}

fn vec_ms<S: Serializer>(values: &[Duration], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(values.iter().map(|d| d.as_secs_f64() * 1000.0))
}

/// Arrival of one output unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TokenEvent {
    /// Position in the output sequence, from 0.
    pub index: usize,
    /// Arrival time measured from the request's dispatch instant.
    #[serde(rename = "offset_ms", serialize_with = "ms")]
    pub offset: Duration,
}

/// Latencies observed by the client.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClientMetrics {
    /// Time to first unit. `None` when no unit arrived.
    #[serde(rename = "ttft_ms", serialize_with = "opt_ms")]
    pub ttft: Option<Duration>,

    /// Mean inter-unit latency, `(last - first) / (units - 1)`.
    /// `None` (not applicable) for fewer than two units.
    #[serde(rename = "tpot_ms", serialize_with = "opt_ms")]
    pub tpot: Option<Duration>,

    /// Dispatch to end of stream (or to failure).
    #[serde(rename = "e2e_latency_ms", serialize_with = "ms")]
    pub e2e_latency: Duration,

    /// Gap between each unit and the previous one.
    #[serde(rename = "inter_unit_gaps_ms", serialize_with = "vec_ms")]
    pub inter_unit_gaps: Vec<Duration>,
}

/// Timings reported by the server through its spans, in milliseconds.
///
/// Attributes the span did not carry stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ServerMetrics {
    pub queue_ms: Option<f64>,
    pub prefill_ms: Option<f64>,
    pub decode_ms: Option<f64>,
    pub inference_ms: Option<f64>,
    pub e2e_ms: Option<f64>,
    pub ttft_ms: Option<f64>,
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub model: Option<String>,
}

/// Token usage as reported in the stream's usage chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: Option<u64>,
    #[serde(default)]
    pub completion_tokens: Option<u64>,
}

/// Failure classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Connect,
    HttpStatus,
    Stream,
    MalformedChunk,
    Timeout,
    Cancelled,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Connect => "connect",
            FailureKind::HttpStatus => "http_status",
            FailureKind::Stream => "stream",
            FailureKind::MalformedChunk => "malformed_chunk",
            FailureKind::Timeout => "timeout",
            FailureKind::Cancelled => "cancelled",
        }
    }
}

/// Failure attached to a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureDetail {
    pub kind: FailureKind,
    pub message: String,
}

impl From<&RequestError> for FailureDetail {
    fn from(err: &RequestError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Outcome of server-side enrichment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EnrichmentStatus {
    /// No span store configured.
    #[default]
    NotAttempted,
    /// Request failed; enrichment was not tried.
    Skipped,
    /// Server metrics attached after `attempts` lookups.
    Enriched { attempts: u32 },
    /// The trace did not show up before the enrichment deadline.
    Unavailable { attempts: u32 },
}

impl EnrichmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrichmentStatus::NotAttempted => "not_attempted",
            EnrichmentStatus::Skipped => "skipped",
            EnrichmentStatus::Enriched { .. } => "enriched",
            EnrichmentStatus::Unavailable { .. } => "unavailable",
        }
    }
}

/// Request parameters copied from the spec for reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestParams {
    pub model: Option<String>,
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: u32,
}

/// Client-side outcome of consuming one stream.
#[derive(Debug, Clone, Default)]
pub struct TimedStream {
    pub events: Vec<TokenEvent>,
    pub client: ClientMetrics,
    pub generated_text: String,
    pub usage: Option<Usage>,
    /// Last `finish_reason` the server reported.
    pub finish_reason: Option<String>,
}

/// Everything known about one request.
#[derive(Debug, Clone, Serialize)]
pub struct RequestRecord {
    pub request_id: Uuid,
    /// Dispatch order, from 0.
    pub sequence: u64,
    #[serde(rename = "traceparent")]
    pub trace: TraceContext,
    /// Trace id in span-store form.
    pub trace_id: String,
    /// Wall-clock dispatch time, milliseconds since the Unix epoch.
    pub sent_at_unix_ms: u64,
    /// Dispatch instant measured from the start of the run.
    #[serde(rename = "dispatch_offset_ms", serialize_with = "ms")]
    pub dispatch_offset: Duration,
    /// Terminal instant measured from the start of the run.
    #[serde(rename = "completion_offset_ms", serialize_with = "opt_ms")]
    pub completion_offset: Option<Duration>,
    pub success: bool,
    pub error: Option<FailureDetail>,
    pub events: Vec<TokenEvent>,
    pub client: ClientMetrics,
    /// Either absent or a complete value assigned in one step.
    pub server: Option<ServerMetrics>,
    pub enrichment: EnrichmentStatus,
    /// Span store UI link, set once enrichment has been attempted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_url: Option<String>,
    pub usage: Option<Usage>,
    pub generated_text: String,
    pub finish_reason: Option<String>,
    pub params: RequestParams,
}

impl RequestRecord {
    /// Create the record for a request at its dispatch instant.
    pub fn dispatched(
        request_id: Uuid,
        sequence: u64,
        trace: TraceContext,
        spec: &RequestSpec,
        dispatch_offset: Duration,
        sent_at_unix_ms: u64,
    ) -> Self {
        Self {
            request_id,
            sequence,
            trace,
            trace_id: trace.trace_id_hex(),
            sent_at_unix_ms,
            dispatch_offset,
            completion_offset: None,
            success: false,
            error: None,
            events: Vec::new(),
            client: ClientMetrics::default(),
            server: None,
            enrichment: EnrichmentStatus::NotAttempted,
            trace_url: None,
            usage: None,
            generated_text: String::new(),
            finish_reason: None,
            params: RequestParams {
                model: spec.model.clone(),
                temperature: spec.sampling.temperature,
                top_p: spec.sampling.top_p,
                max_tokens: spec.sampling.max_tokens,
            },
        }
    }

    /// Store the stream outcome. Partial events are kept on failure.
    pub fn complete(
        &mut self,
        timed: TimedStream,
        error: Option<RequestError>,
        completion_offset: Duration,
    ) {
        self.events = timed.events;
        self.client = timed.client;
        self.generated_text = timed.generated_text;
        self.usage = timed.usage;
        self.finish_reason = timed.finish_reason;
        self.completion_offset = Some(completion_offset);
        self.success = error.is_none();
        self.error = error.as_ref().map(FailureDetail::from);
    }

    /// Attach server metrics. Returns `false` and leaves the record untouched
    /// if metrics were already attached.
    pub fn attach_server_metrics(&mut self, metrics: ServerMetrics, attempts: u32) -> bool {
        if self.server.is_some() {
            return false;
        }
        self.server = Some(metrics);
        self.enrichment = EnrichmentStatus::Enriched { attempts };
        true
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    /// Completion tokens, preferring the server's count over the stream's usage chunk.
    pub fn completion_tokens(&self) -> Option<u64> {
        self.server
            .as_ref()
            .and_then(|s| s.completion_tokens)
            .or_else(|| self.usage.and_then(|u| u.completion_tokens))
    }

    /// Prompt tokens, preferring the server's count over the stream's usage chunk.
    pub fn prompt_tokens(&self) -> Option<u64> {
        self.server
            .as_ref()
            .and_then(|s| s.prompt_tokens)
            .or_else(|| self.usage.and_then(|u| u.prompt_tokens))
    }
}
