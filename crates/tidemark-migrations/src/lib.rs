//! # tidemark-migrations
//!
//! Migration engine for tidemark. Applies an ordered set of versioned
//! migration files exactly once, records progress in a ledger table inside the
//! target database, and halts with a dirty ledger entry when a migration fails
//! part way.
//!
//! ## Architecture
//!
//! - [`MigrationLoader`] discovers `<version>_<name>.<ext>` files and returns
//!   them as [`Migrations`], sorted by numeric version.
//! - [`statement`] splits migration text into typed statements and groups
//!   them into batches of contiguous schema or data changes.
//! - [`VersionLedger`] reads and writes the ledger table.
//! - [`Executor`] applies one batch as a polled schema operation, a retried
//!   transaction, or partitioned statements, all under a deadline.
//! - [`MigrationRunner`] drives a run through its state machine.
//! - [`Migrator`] exposes the operations a front end calls.
//!
//! ## Module Overview
//!
//! - [`migration`] - `MigrationFile`, `Migration`
//! - [`loader`] - `MigrationLoader`, `Migrations`
//! - [`statement`] - `Statement`, `StatementKind`, `Batch`, splitting and classification
//! - [`ledger`] - `VersionLedger`, `LedgerEntry`
//! - [`executor`] - `Executor`, `DataChangeMode`, `BatchReport`
//! - [`runner`] - `MigrationRunner`, `RunState`, `MigrateOptions`, `MigrateReport`
//! - [`migrator`] - `Migrator`, `ResetReport`, `TruncatedTable`

#![allow(clippy::result_large_err)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::future_not_send)]

pub mod executor;
pub mod ledger;
pub mod loader;
pub mod migration;
pub mod migrator;
pub mod runner;
pub mod statement;

// Re-export key types at the crate root.
pub use executor::{BatchReport, DataChangeMode, Executor};
pub use ledger::{LedgerEntry, VersionLedger};
pub use loader::{MigrationLoader, Migrations};
pub use migration::{Migration, MigrationFile};
pub use migrator::{Migrator, ResetReport, TruncatedTable};
pub use runner::{AppliedMigration, MigrateOptions, MigrateReport, MigrationRunner, RunState};
pub use statement::{Batch, Statement, StatementKind};
