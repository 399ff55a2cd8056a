//! # tidemark-cli
//!
//! Management commands for the tidemark binary.
//!
//! This crate provides:
//!
//! - **Management commands** - A small framework for defining and registering
//!   CLI commands ([`command::ManagementCommand`], [`command::CommandRegistry`])
//! - **Built-in commands** - `migrate`, `status`, `history`, `set-version`,
//!   `load`, `apply`, `truncate`, `create`, `drop` and `reset`, each a thin
//!   wrapper over
//!   [`tidemark_migrations::Migrator`]
//!
//! Global options are turned into one [`tidemark_core::Config`] by
//! [`command::config_from_matches`] before any command runs.
//!
//! ## Quick Start
//!
//! ```rust
//! use tidemark_cli::command::CommandRegistry;
//! use tidemark_cli::commands::register_builtin_commands;
//!
//! let mut registry = CommandRegistry::new();
//! register_builtin_commands(&mut registry);
//!
//! let names = registry.list_commands();
//! assert!(names.contains(&"migrate"));
//! assert!(names.contains(&"status"));
//! ```

// These clippy lints are intentionally allowed:
// - result_large_err: TidemarkError is the crate-wide error type
// - doc_markdown: backtick requirements for documentation items are too strict
// - module_name_repetitions: re-exports make module-prefixed names redundant
// - unused_async: command handlers keep consistent async signatures
#![allow(clippy::result_large_err)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::unused_async)]

pub mod command;
pub mod commands;
