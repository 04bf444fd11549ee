//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for a benchmark run.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::dispatch::rate::TargetRate;

/// Root configuration for a benchmark run.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BenchConfig {
    /// Inference service endpoint.
    pub target: TargetConfig,

    /// Load shape: rate, count, timeouts.
    pub load: LoadConfig,

    /// Sampling parameters forwarded into every request.
    pub sampling: SamplingConfig,

    /// Span store used to correlate server-side timings.
    pub span_store: SpanStoreConfig,

    /// Prompt source.
    pub workload: WorkloadConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Inference service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Base URL of the service (e.g., "http://localhost:8000").
    pub base_url: String,

    /// Path of the streaming chat completion route.
    pub chat_path: String,

    /// Model identifier. `None` lets the server pick its default model.
    pub model: Option<String>,

    /// Optional bearer token.
    pub api_key: Option<String>,

    /// Ask the server to append a usage chunk to the stream.
    pub include_usage: bool,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            chat_path: "/v1/chat/completions".to_string(),
            model: None,
            api_key: None,
            include_usage: true,
        }
    }
}

/// Load generation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoadConfig {
    /// Target dispatch rate in requests per second, or "unlimited".
    pub rate: TargetRate,

    /// Number of requests to issue. `None` runs until stopped.
    pub request_count: Option<u64>,

    /// Stop scheduling after this many seconds (acts like a stop signal).
    pub max_duration_secs: Option<u64>,

    /// Deadline for one request, from dispatch to end of stream.
    pub request_timeout_ms: u64,

    /// Time in-flight requests get to finish after a stop signal.
    pub grace_period_ms: u64,

    /// Interval between progress log lines. 0 disables progress logging.
    pub progress_interval_secs: u64,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            rate: TargetRate::Unlimited,
            request_count: Some(100),
            max_duration_secs: None,
            request_timeout_ms: 120_000,
            grace_period_ms: 5_000,
            progress_interval_secs: 5,
        }
    }
}

/// Sampling parameters, forwarded verbatim into the request body.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub temperature: f64,

    /// Maximum number of output tokens.
    pub max_tokens: u32,

    pub top_p: f64,

    /// Additional body parameters (e.g. `top_k`, `seed`), passed through untouched.
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 100,
            top_p: 1.0,
            extra: serde_json::Map::new(),
        }
    }
}

/// Span store (Jaeger query API) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SpanStoreConfig {
    /// Enable server-side enrichment.
    pub enabled: bool,

    /// Base URL of the query service (e.g., "http://localhost:16686").
    pub base_url: String,

    /// Operation name of the span carrying the latency attributes.
    pub operation_name: String,

    /// Give up on a trace after this long.
    pub timeout_ms: u64,

    /// First delay between lookups in milliseconds.
    pub initial_backoff_ms: u64,

    /// Upper bound on the delay between lookups in milliseconds.
    pub max_backoff_ms: u64,

    /// Maximum number of records enriched concurrently.
    pub concurrency: usize,
}

impl Default for SpanStoreConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "http://localhost:16686".to_string(),
            operation_name: "llm_request".to_string(),
            timeout_ms: 10_000,
            initial_backoff_ms: 100,
            max_backoff_ms: 2_000,
            concurrency: 32,
        }
    }
}

/// Input file format for prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PromptFormat {
    /// One `{"prompt": "...", "max_tokens": n}` object per line.
    #[default]
    Jsonl,
    /// ShareGPT conversation dump; the first human turn of each conversation is used.
    Sharegpt,
}

/// Prompt source configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct WorkloadConfig {
    /// Inline prompts, used before any file prompts.
    pub prompts: Vec<String>,

    /// Prompt file.
    pub prompts_file: Option<PathBuf>,

    pub format: PromptFormat,

    /// Keep at most this many prompts.
    pub limit: Option<usize>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Prometheus exporter bind address. Disabled when `None`.
    pub metrics_address: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_address: None,
        }
    }
}
