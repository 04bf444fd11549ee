//! Client/server correlation subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatch:
//!     context.rs → fresh TraceContext → `traceparent` header
//!
//! After the request is finalized:
//!     correlator.rs → store.rs (lookup by trace id, with backoff)
//!                   → attributes.rs (span attributes → ServerMetrics)
//!                   → record.server (set once)
//! ```

pub mod attributes;
pub mod context;
pub mod correlator;
pub mod store;

pub use context::{TraceContext, TRACEPARENT_HEADER};
pub use correlator::{Correlator, CorrelatorSettings};
pub use store::{JaegerSpanStore, Span, SpanStore, SpanStoreError, Trace};
