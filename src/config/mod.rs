//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → BenchConfig (validated, immutable)
//!     → split into per-subsystem settings by the runner
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Invalid configs fail before any request is dispatched

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, read_config, ConfigError};
pub use schema::{
    BenchConfig, LoadConfig, LogFormat, ObservabilityConfig, PromptFormat, SamplingConfig,
    SpanStoreConfig, TargetConfig, WorkloadConfig,
};
pub use validation::{validate_config, ValidationError};
