//! Outbound streaming call to the inference service.

use futures_util::future::BoxFuture;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use uuid::Uuid;

use crate::config::TargetConfig;
use crate::correlation::context::{TraceContext, TRACEPARENT_HEADER};
use crate::inference::error::RequestError;
use crate::inference::request::RequestSpec;
use crate::stream::sse::{decode_frames, FrameStream};

/// Header carrying the record's request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// One request as it goes out.
#[derive(Debug, Clone, Copy)]
pub struct OutboundRequest<'a> {
    pub request_id: Uuid,
    pub trace: TraceContext,
    pub spec: &'a RequestSpec,
}

/// A streaming inference endpoint.
///
/// `open_stream` resolves once response headers arrive with a success status;
/// the body is then pulled frame by frame by the caller.
pub trait InferenceBackend: Send + Sync {
    fn open_stream<'a>(
        &'a self,
        request: OutboundRequest<'a>,
    ) -> BoxFuture<'a, Result<FrameStream, RequestError>>;
}

/// OpenAI-compatible chat completions over HTTP.
#[derive(Debug, Clone)]
pub struct HttpInferenceClient {
    client: Client,
    url: String,
    api_key: Option<String>,
    include_usage: bool,
}

impl HttpInferenceClient {
    pub fn new(config: &TargetConfig) -> Result<Self, reqwest::Error> {
        // Benchmarks talk to the service directly, never through an env proxy.
        let client = Client::builder().no_proxy().build()?;
        Ok(Self {
            client,
            url: format!("{}{}", config.base_url.trim_end_matches('/'), config.chat_path),
            api_key: config.api_key.clone(),
            include_usage: config.include_usage,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn send(&self, request: OutboundRequest<'_>) -> Result<FrameStream, RequestError> {
        let mut builder = self
            .client
            .post(&self.url)
            .header(TRACEPARENT_HEADER, request.trace.encode())
            .header(REQUEST_ID_HEADER, request.request_id.to_string())
            .header(CONTENT_TYPE, "application/json")
            .json(&request.spec.body(self.include_usage));

        if let Some(key) = &self.api_key {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", key));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| RequestError::Connect(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RequestError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        Ok(decode_frames(response.bytes_stream()))
    }
}

impl InferenceBackend for HttpInferenceClient {
    fn open_stream<'a>(
        &'a self,
        request: OutboundRequest<'a>,
    ) -> BoxFuture<'a, Result<FrameStream, RequestError>> {
        Box::pin(self.send(request))
    }
}
