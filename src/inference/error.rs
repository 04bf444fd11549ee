//! Per-request failure types.

use thiserror::Error;

use crate::results::record::FailureKind;

/// Why a single request did not complete successfully.
///
/// Always local to one request: the dispatcher records it on the request's
/// record and carries on.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RequestError {
    /// The request could not be sent (connection refused, DNS, TLS, ...).
    #[error("connection failed: {0}")]
    Connect(String),

    /// The service answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// Transport error after the response started.
    #[error("stream interrupted: {0}")]
    Stream(String),

    /// The byte stream ended before the `[DONE]` marker.
    #[error("stream ended before the end marker")]
    Truncated,

    /// A chunk could not be decoded.
    #[error("malformed chunk: {0}")]
    MalformedChunk(String),

    /// The service reported an error inside the stream.
    #[error("server error in stream: {0}")]
    Server(String),

    /// The per-request deadline expired.
    #[error("request timed out after {0} ms")]
    Timeout(u64),

    /// The run was cancelled while the request was in flight.
    #[error("cancelled: {0}")]
    Cancelled(String),
}

impl RequestError {
    pub fn kind(&self) -> FailureKind {
        match self {
            RequestError::Connect(_) => FailureKind::Connect,
            RequestError::HttpStatus { .. } => FailureKind::HttpStatus,
            RequestError::Stream(_) | RequestError::Truncated | RequestError::Server(_) => {
                FailureKind::Stream
            }
            RequestError::MalformedChunk(_) => FailureKind::MalformedChunk,
            RequestError::Timeout(_) => FailureKind::Timeout,
            RequestError::Cancelled(_) => FailureKind::Cancelled,
        }
    }
}
