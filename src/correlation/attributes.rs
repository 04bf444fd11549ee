//! Mapping from span attributes to server metrics.

use std::collections::HashMap;

use serde_json::Value;

use crate::correlation::store::Trace;
use crate::results::record::ServerMetrics;

pub const QUEUE_TIME: &str = "gen_ai.latency.time_in_queue";
pub const PREFILL_TIME: &str = "gen_ai.latency.time_in_model_prefill";
pub const DECODE_TIME: &str = "gen_ai.latency.time_in_model_decode";
pub const INFERENCE_TIME: &str = "gen_ai.latency.time_in_model_inference";
pub const E2E_TIME: &str = "gen_ai.latency.e2e";
pub const FIRST_TOKEN_TIME: &str = "gen_ai.latency.time_to_first_token";
pub const PROMPT_TOKENS: &str = "gen_ai.usage.prompt_tokens";
pub const COMPLETION_TOKENS: &str = "gen_ai.usage.completion_tokens";
pub const RESPONSE_MODEL: &str = "gen_ai.response.model";

/// Numbers may arrive as JSON numbers or as numeric strings.
fn number(attributes: &HashMap<String, Value>, key: &str) -> Option<f64> {
    let value = match attributes.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    value.filter(|v: &f64| v.is_finite())
}

/// Latencies are reported in seconds.
fn seconds_as_ms(attributes: &HashMap<String, Value>, key: &str) -> Option<f64> {
    number(attributes, key).map(|secs| secs * 1000.0)
}

fn count(attributes: &HashMap<String, Value>, key: &str) -> Option<u64> {
    number(attributes, key)
        .filter(|v| *v >= 0.0)
        .map(|v| v.round() as u64)
}

fn text(attributes: &HashMap<String, Value>, key: &str) -> Option<String> {
    attributes.get(key)?.as_str().map(str::to_string)
}

/// Server metrics from the first span named `operation_name`.
///
/// `None` when the trace has no such span. Attributes the span lacks are
/// left `None`.
pub fn extract_server_metrics(trace: &Trace, operation_name: &str) -> Option<ServerMetrics> {
    let attrs = &trace.find_span(operation_name)?.attributes;
    Some(ServerMetrics {
        queue_ms: seconds_as_ms(attrs, QUEUE_TIME),
        prefill_ms: seconds_as_ms(attrs, PREFILL_TIME),
        decode_ms: seconds_as_ms(attrs, DECODE_TIME),
        inference_ms: seconds_as_ms(attrs, INFERENCE_TIME),
        e2e_ms: seconds_as_ms(attrs, E2E_TIME),
        ttft_ms: seconds_as_ms(attrs, FIRST_TOKEN_TIME),
        prompt_tokens: count(attrs, PROMPT_TOKENS),
        completion_tokens: count(attrs, COMPLETION_TOKENS),
        model: text(attrs, RESPONSE_MODEL),
    })
}
