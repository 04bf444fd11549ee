//! Span store lookup by trace id.

use std::collections::HashMap;
use std::time::Duration;

use futures_util::future::BoxFuture;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Errors from a single lookup. All are retried by the correlator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SpanStoreError {
    #[error("span store unreachable: {0}")]
    Transport(String),

    #[error("span store returned HTTP {0}")]
    Status(u16),

    #[error("undecodable span store response: {0}")]
    Decode(String),
}

/// One server-recorded span.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Span {
    pub operation_name: String,
    pub attributes: HashMap<String, Value>,
}

/// All spans recorded under one trace id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trace {
    pub trace_id: String,
    pub spans: Vec<Span>,
}

impl Trace {
    /// First span with the given operation name.
    pub fn find_span(&self, operation_name: &str) -> Option<&Span> {
        self.spans.iter().find(|s| s.operation_name == operation_name)
    }
}

/// Queryable store of server spans.
///
/// `Ok(None)` means the trace is not (yet) known to the store.
pub trait SpanStore: Send + Sync {
    fn fetch_trace<'a>(
        &'a self,
        trace_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<Trace>, SpanStoreError>>;

    /// Link to the trace in the store's UI, if it has one.
    fn trace_url(&self, _trace_id: &str) -> Option<String> {
        None
    }
}

#[derive(Debug, Deserialize)]
struct JaegerResponse {
    #[serde(default)]
    data: Option<Vec<JaegerTrace>>,
}

#[derive(Debug, Deserialize)]
struct JaegerTrace {
    #[serde(rename = "traceID", default)]
    trace_id: String,
    #[serde(default)]
    spans: Vec<JaegerSpan>,
}

#[derive(Debug, Deserialize)]
struct JaegerSpan {
    #[serde(rename = "operationName", default)]
    operation_name: String,
    #[serde(default)]
    tags: Vec<JaegerTag>,
}

#[derive(Debug, Deserialize)]
struct JaegerTag {
    key: String,
    #[serde(default)]
    value: Value,
}

impl From<JaegerTrace> for Trace {
    fn from(trace: JaegerTrace) -> Self {
        Trace {
            trace_id: trace.trace_id,
            spans: trace
                .spans
                .into_iter()
                .map(|span| Span {
                    operation_name: span.operation_name,
                    attributes: span.tags.into_iter().map(|t| (t.key, t.value)).collect(),
                })
                .collect(),
        }
    }
}

/// Jaeger query API client.
#[derive(Debug, Clone)]
pub struct JaegerSpanStore {
    client: Client,
    base_url: String,
}

impl JaegerSpanStore {
    /// `request_timeout` bounds each lookup, not the whole enrichment.
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .no_proxy()
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn lookup(&self, trace_id: &str) -> Result<Option<Trace>, SpanStoreError> {
        let url = format!("{}/api/traces/{}", self.base_url, trace_id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| SpanStoreError::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(SpanStoreError::Status(status.as_u16()));
        }

        let body: JaegerResponse = response
            .json()
            .await
            .map_err(|e| SpanStoreError::Decode(e.to_string()))?;

        let trace = body
            .data
            .unwrap_or_default()
            .into_iter()
            .next()
            .map(Trace::from)
            .filter(|t| !t.spans.is_empty());
        Ok(trace)
    }
}

impl SpanStore for JaegerSpanStore {
    fn fetch_trace<'a>(
        &'a self,
        trace_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<Trace>, SpanStoreError>> {
        Box::pin(self.lookup(trace_id))
    }

    fn trace_url(&self, trace_id: &str) -> Option<String> {
        Some(format!("{}/trace/{}", self.base_url, trace_id))
    }
}
