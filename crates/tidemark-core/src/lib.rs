//! # tidemark-core
//!
//! Foundation types shared by every tidemark crate: the error taxonomy, the
//! immutable run configuration, and `tracing` setup. This crate has no
//! database dependencies.
//!
//! ## Modules
//!
//! - [`error`] - `TidemarkError`, its categories, and the result alias
//! - [`config`] - `Config` and its TOML loader
//! - [`logging`] - Tracing subscriber setup and per-migration spans

pub mod config;
pub mod error;
pub mod logging;

// Re-export the most commonly used types at the crate root.
pub use config::{Config, ExecutionSettings, LogFormat, Priority, RetryPolicy};
pub use error::{ErrorCategory, TidemarkError, TidemarkResult};
