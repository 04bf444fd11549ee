//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Span store lookup:
//!     → backoff.rs (attempt count, next delay, jitter)
//!     → correlator polls until found or until its own deadline
//! ```
//!
//! # Design Decisions
//! - Every external call has a deadline (request timeout, enrichment timeout)
//! - Jittered backoff keeps concurrent pollers from hitting the store in lockstep
//! - Retry loops are explicit state, never recursion

pub mod backoff;

pub use backoff::Backoff;
