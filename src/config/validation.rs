//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (rate > 0, timeouts > 0, backoff bounds ordered)
//! - Check endpoints parse as URLs
//! - Check a prompt source exists
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: BenchConfig → Result<(), Vec<ValidationError>>
//! - Runs before the first request is dispatched

use std::fmt;

use url::Url;

use crate::config::schema::BenchConfig;
use crate::dispatch::rate::TargetRate;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field, e.g. `load.rate`.
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &BenchConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let TargetRate::PerSecond(rate) = config.load.rate {
        if !rate.is_finite() || rate <= 0.0 {
            errors.push(ValidationError::new(
                "load.rate",
                format!("must be a positive finite number or \"unlimited\", got {}", rate),
            ));
        }
    }
    if config.load.rate.is_unlimited() && config.load.request_count.is_none() {
        errors.push(ValidationError::new(
            "load.request_count",
            "is required when rate is \"unlimited\"",
        ));
    }
    if config.load.request_timeout_ms == 0 {
        errors.push(ValidationError::new("load.request_timeout_ms", "must be greater than 0"));
    }
    if config.load.max_duration_secs == Some(0) {
        errors.push(ValidationError::new("load.max_duration_secs", "must be greater than 0"));
    }

    check_url(&config.target.base_url, "target.base_url", &mut errors);
    if !config.target.chat_path.starts_with('/') {
        errors.push(ValidationError::new("target.chat_path", "must start with '/'"));
    }

    let sampling = &config.sampling;
    if !sampling.temperature.is_finite() || sampling.temperature < 0.0 {
        errors.push(ValidationError::new("sampling.temperature", "must be >= 0"));
    }
    if !(sampling.top_p > 0.0 && sampling.top_p <= 1.0) {
        errors.push(ValidationError::new("sampling.top_p", "must be in (0, 1]"));
    }
    if sampling.max_tokens == 0 {
        errors.push(ValidationError::new("sampling.max_tokens", "must be greater than 0"));
    }

    let store = &config.span_store;
    if store.enabled {
        check_url(&store.base_url, "span_store.base_url", &mut errors);
        if store.timeout_ms == 0 {
            errors.push(ValidationError::new("span_store.timeout_ms", "must be greater than 0"));
        }
        if store.initial_backoff_ms == 0 {
            errors.push(ValidationError::new(
                "span_store.initial_backoff_ms",
                "must be greater than 0",
            ));
        }
        if store.initial_backoff_ms > store.max_backoff_ms {
            errors.push(ValidationError::new(
                "span_store.max_backoff_ms",
                "must be >= initial_backoff_ms",
            ));
        }
        if store.concurrency == 0 {
            errors.push(ValidationError::new("span_store.concurrency", "must be greater than 0"));
        }
        if store.operation_name.trim().is_empty() {
            errors.push(ValidationError::new("span_store.operation_name", "must not be empty"));
        }
    }

    if config.workload.prompts.is_empty() && config.workload.prompts_file.is_none() {
        errors.push(ValidationError::new(
            "workload",
            "either prompts or prompts_file must be set",
        ));
    }
    if config.workload.limit == Some(0) {
        errors.push(ValidationError::new("workload.limit", "must be greater than 0"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_url(value: &str, field: &'static str, errors: &mut Vec<ValidationError>) {
    match Url::parse(value) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
        Ok(url) => errors.push(ValidationError::new(
            field,
            format!("unsupported scheme '{}'", url.scheme()),
        )),
        Err(e) => errors.push(ValidationError::new(field, format!("invalid URL '{}': {}", value, e))),
    }
}
