//! # tidemark
//!
//! Versioned schema and data migrations for distributed SQL databases.
//!
//! This is the meta-crate that re-exports all sub-crates for convenient access.
//! You can depend on `tidemark` to get the whole tool, or depend on individual
//! crates for finer-grained control.
//!
//! ```rust,no_run
//! use tidemark::prelude::*;
//!
//! # async fn run() -> Result<(), TidemarkError> {
//! let config = Config::from_toml_file("tidemark.toml")?;
//! let db = tidemark::db_backends::connect(&config.database)?;
//! let migrator = Migrator::new(db.as_ref(), &config);
//! let report = migrator
//!     .migrate("migrations".as_ref(), &MigrateOptions::from_config(&config))
//!     .await?;
//! println!("now at version {}", report.current_version);
//! # Ok(())
//! # }
//! ```

/// Error taxonomy, configuration and logging setup.
pub use tidemark_core as core;

/// The target-database seam and the SQLite backend.
pub use tidemark_db_backends as db_backends;

/// Loader, classifier, ledger, executor, runner and the `Migrator` facade.
pub use tidemark_migrations as migrations;

/// Management commands (CLI).
#[cfg(feature = "cli")]
pub use tidemark_cli as cli;

// Third-party re-exports
pub use async_trait::async_trait;
pub use chrono;
pub use serde;
pub use serde_json;
pub use tokio;
pub use tracing;
pub use tracing_subscriber;

/// The types most programs need.
pub mod prelude {
    pub use tidemark_core::{Config, ExecutionSettings, LogFormat, Priority, TidemarkError};
    pub use tidemark_db_backends::{Database, PartitionedOptions};
    pub use tidemark_migrations::{
        DataChangeMode, LedgerEntry, MigrateOptions, MigrateReport, Migrator, ResetReport, RunState,
    };
}
