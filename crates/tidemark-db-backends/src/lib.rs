//! # tidemark-db-backends
//!
//! The seam between tidemark and the target database. Migrations only talk to
//! a [`Database`]; each backend decides how schema batches, transactions, and
//! partitioned statements are carried out.
//!
//! Supported backends:
//! - `SQLite` (feature `sqlite`, on by default)

pub mod base;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod value;

pub use base::{Database, OperationStatus, PartitionedOptions, SchemaOperation};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteBackend;
pub use value::{FromValue, Row, Value};

use tidemark_core::config::DatabaseSettings;
use tidemark_core::TidemarkError;

/// Opens the database described by `settings`.
///
/// The engine name is matched case-insensitively.
pub fn connect(settings: &DatabaseSettings) -> Result<Box<dyn Database>, TidemarkError> {
    match settings.engine.to_ascii_lowercase().as_str() {
        #[cfg(feature = "sqlite")]
        "sqlite" | "sqlite3" => Ok(Box::new(SqliteBackend::open(&settings.name)?)),
        other => Err(TidemarkError::Configuration(format!(
            "Unsupported database engine '{other}'"
        ))),
    }
}
