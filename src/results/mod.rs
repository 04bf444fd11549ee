//! Results subsystem.
//!
//! # Data Flow
//! ```text
//! request task
//!     → record.rs (RequestRecord, completed once)
//!     → correlator (server metrics attached at most once)
//!     → summary.rs (percentile tables, throughput)
//! ```

pub mod percentile;
pub mod record;
pub mod summary;

pub use record::{
    ClientMetrics, EnrichmentStatus, FailureDetail, FailureKind, RequestParams, RequestRecord,
    ServerMetrics, TimedStream, TokenEvent, Usage,
};
pub use summary::{summarize, BenchmarkSummary, Distribution};
