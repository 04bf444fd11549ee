//! Inference service interface.
//!
//! # Data Flow
//! ```text
//! RequestSpec + TraceContext + request id
//!     → client.rs (POST, headers, status check)
//!     → FrameStream handed to the stream timer
//! ```
//!
//! # Design Decisions
//! - The service is opaque: anything implementing `InferenceBackend` works
//! - Errors are per request and never abort the run

pub mod client;
pub mod error;
pub mod request;

pub use client::{HttpInferenceClient, InferenceBackend, OutboundRequest, REQUEST_ID_HEADER};
pub use error::RequestError;
pub use request::{ChatMessage, RequestSpec, SamplingParams};
