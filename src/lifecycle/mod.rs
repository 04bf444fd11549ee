//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Stop (shutdown.rs):
//!     Signal received → Stop scheduling → Grace period → Cancel in-flight → Exit
//!
//! Signals (signals.rs):
//!     SIGINT → stop
//!     second SIGINT → cancel immediately
//! ```
//!
//! # Design Decisions
//! - Stop and cancel are two separate signals
//! - Records finalized before a stop are never touched by it

pub mod shutdown;
pub mod signals;

pub use shutdown::{Shutdown, ShutdownListener};
