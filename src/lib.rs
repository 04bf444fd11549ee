//! Streaming LLM inference latency benchmark.
//!
//! Drives a streaming chat-completions endpoint at a target arrival rate,
//! timestamps every output unit of every request, and joins the client-side
//! timings with the server's own spans through a per-request trace id.
//!
//! # Architecture Overview
//!
//! ```text
//!   ┌──────────────┐   spec    ┌─────────────┐  traceparent  ┌──────────────────┐
//!   │   workload   │──────────▶│  dispatch   │──────────────▶│ inference service│
//!   │   prompts    │           │ open loop   │◀──── SSE ─────│   (opaque)       │
//!   └──────────────┘           └──────┬──────┘               └──────────────────┘
//!                                     │ stream::timer
//!                                     ▼
//!                              ┌─────────────┐   trace id    ┌──────────────────┐
//!                              │ RequestRecord│─────────────▶│   span store     │
//!                              └──────┬──────┘◀── spans ─────│   (Jaeger)       │
//!                                     │ correlation           └──────────────────┘
//!                                     ▼
//!                              ┌─────────────┐
//!                              │  results    │ percentiles, throughput
//!                              └─────────────┘
//! ```

// Core pipeline
pub mod correlation;
pub mod dispatch;
pub mod inference;
pub mod results;
pub mod runner;
pub mod stream;
pub mod workload;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::schema::BenchConfig;
pub use lifecycle::Shutdown;
pub use runner::{BenchmarkReport, BenchmarkRunner, RunnerError};
