//! Rate-controlled dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! RequestSpec iterator
//!     → dispatcher.rs (open-loop schedule from rate.rs, stop handling)
//!     → task.rs (one task per request: send, stream, timeout, cancel)
//!     → finalized RequestRecord → collection channel
//! ```

pub mod dispatcher;
pub mod rate;
pub mod task;

pub use dispatcher::{DispatchReport, DispatchSettings, Dispatcher, StopReason};
pub use rate::TargetRate;
pub use task::{DispatchStats, InFlightGuard};
