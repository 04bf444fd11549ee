//! Immutable request inputs and the outbound JSON body.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::config::SamplingConfig;

/// One chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Sampling parameters sent with every request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SamplingParams {
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
    /// Forwarded verbatim into the request body.
    pub extra: Map<String, Value>,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self::from(&SamplingConfig::default())
    }
}

impl From<&SamplingConfig> for SamplingParams {
    fn from(config: &SamplingConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            top_p: config.top_p,
            extra: config.extra.clone(),
        }
    }
}

/// What to send for one request. Built by the workload layer, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    pub messages: Vec<ChatMessage>,
    pub sampling: SamplingParams,
    /// `None` lets the service pick its default model.
    pub model: Option<String>,
}

impl RequestSpec {
    /// Single user-turn request.
    pub fn user_prompt(
        prompt: impl Into<String>,
        sampling: SamplingParams,
        model: Option<String>,
    ) -> Self {
        Self {
            messages: vec![ChatMessage::user(prompt)],
            sampling,
            model,
        }
    }

    /// Streaming chat-completions body.
    ///
    /// Extra sampling parameters are merged last but never replace `messages`
    /// or `stream`.
    pub fn body(&self, include_usage: bool) -> Value {
        let mut body = Map::new();
        for (key, value) in &self.sampling.extra {
            body.insert(key.clone(), value.clone());
        }
        body.insert("temperature".into(), json!(self.sampling.temperature));
        body.insert("max_tokens".into(), json!(self.sampling.max_tokens));
        body.insert("top_p".into(), json!(self.sampling.top_p));
        if let Some(model) = &self.model {
            body.insert("model".into(), json!(model));
        }
        if include_usage {
            body.insert("stream_options".into(), json!({ "include_usage": true }));
        }
        body.insert("messages".into(), json!(self.messages));
        body.insert("stream".into(), Value::Bool(true));
        Value::Object(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_shape() {
        let mut sampling = SamplingParams::default();
        sampling.max_tokens = 64;
        sampling.extra.insert("seed".into(), json!(42));
        sampling.extra.insert("stream".into(), json!(false));
        let spec = RequestSpec::user_prompt("hello", sampling, Some("qwen".into()));

        let body = spec.body(true);
        assert_eq!(body["stream"], json!(true));
        assert_eq!(body["max_tokens"], json!(64));
        assert_eq!(body["model"], json!("qwen"));
        assert_eq!(body["seed"], json!(42));
        assert_eq!(body["stream_options"]["include_usage"], json!(true));
        assert_eq!(body["messages"][0]["role"], json!("user"));
        assert_eq!(body["messages"][0]["content"], json!("hello"));
    }

    #[test]
    fn test_body_omits_optional_fields() {
        let spec = RequestSpec::user_prompt("hi", SamplingParams::default(), None);
        let body = spec.body(false);
        assert!(body.get("model").is_none());
        assert!(body.get("stream_options").is_none());
    }
}
