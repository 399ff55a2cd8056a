//! Core error types for tidemark.
//!
//! This module provides the crate-wide error enum [`TidemarkError`]. Its
//! variants follow the lifecycle of a run: loading migration files,
//! classifying their statements, talking to the database, and applying
//! batches. Each variant maps to an [`ErrorCategory`] so callers can decide
//! whether a retry is safe or whether the ledger needs operator attention.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// The coarse class an error belongs to.
///
/// Categories tell the caller what state the database is in after the error:
/// `Load` and `Classify` errors happen before anything is mutated, while
/// `SchemaApply`, `DataApply` and `Timeout` leave a dirty ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Migration files could not be loaded.
    Load,
    /// A statement could not be classified.
    Classify,
    /// The database could not be reached. Retried by the client, not by tidemark.
    Connection,
    /// A schema-change batch failed.
    SchemaApply,
    /// A data-change batch failed.
    DataApply,
    /// A deadline expired while waiting on the database.
    Timeout,
    /// The ledger was already dirty when the run started.
    Blocked,
    /// Any other database error, including ledger bookkeeping failures.
    Database,
    /// The configuration is missing or invalid.
    Configuration,
    /// A filesystem error.
    Io,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Load => "load",
            Self::Classify => "classify",
            Self::Connection => "connection",
            Self::SchemaApply => "schema-apply",
            Self::DataApply => "data-apply",
            Self::Timeout => "timeout",
            Self::Blocked => "blocked",
            Self::Database => "database",
            Self::Configuration => "configuration",
            Self::Io => "io",
        };
        f.write_str(name)
    }
}

/// The primary error type for tidemark.
///
/// A `version` of `0` in the apply variants means the statements did not come
/// from a versioned migration (for example a baseline schema or a file passed
/// to `apply`).
#[derive(Error, Debug)]
pub enum TidemarkError {
    // ── Loading ──────────────────────────────────────────────────────

    /// Two migration files share the same version prefix.
    #[error(
        "Duplicate migration version {version}: '{}' and '{}'",
        .first.display(),
        .second.display()
    )]
    DuplicateVersion {
        /// The shared version.
        version: u64,
        /// The first file seen with this version.
        first: PathBuf,
        /// The second file seen with this version.
        second: PathBuf,
    },

    /// A file name does not follow `<version>_<name>.<ext>`.
    #[error("Invalid migration file name '{0}': expected <version>_<name>.<ext> with a positive version")]
    InvalidName(String),

    // ── Classification ───────────────────────────────────────────────

    /// A statement does not start with a known keyword.
    #[error("Unknown statement kind at statement {index}: {statement}")]
    UnknownStatementKind {
        /// Position of the statement within its file.
        index: usize,
        /// The beginning of the offending statement.
        statement: String,
    },

    // ── Database ─────────────────────────────────────────────────────

    /// The database could not be reached.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A transaction was aborted by contention and may be retried.
    #[error("Transaction aborted: {0}")]
    Aborted(String),

    /// A statement inside a submitted batch failed.
    #[error("Statement {offset} of batch failed: {message}")]
    StatementFailed {
        /// Offset of the failing statement within the submitted batch.
        offset: usize,
        /// The database's error message.
        message: String,
    },

    /// A generic database error.
    #[error("Database error: {0}")]
    Database(String),

    // ── Execution ────────────────────────────────────────────────────

    /// A schema-change batch failed while applying a migration.
    #[error("Schema change failed in version {version} at statement {statement_index}: {message}")]
    SchemaApply {
        /// The migration version being applied.
        version: u64,
        /// Index of the failing statement within the migration.
        statement_index: usize,
        /// The database's error message.
        message: String,
    },

    /// A data-change batch failed while applying a migration.
    #[error("Data change failed in version {version} at statement {statement_index}: {message}")]
    DataApply {
        /// The migration version being applied.
        version: u64,
        /// Index of the failing statement within the migration.
        statement_index: usize,
        /// The database's error message.
        message: String,
    },

    /// The deadline expired; the remote operation's outcome is unknown.
    #[error("Timed out applying version {version}; remote state is unknown and must be verified manually")]
    Timeout {
        /// The migration version being applied.
        version: u64,
    },

    /// The ledger has a dirty entry, so no migration was attempted.
    #[error("Migration version {version} is dirty; fix the database and clear the dirty flag before migrating")]
    Blocked {
        /// The dirty version.
        version: u64,
    },

    // ── Configuration ────────────────────────────────────────────────

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),

    // ── IO ───────────────────────────────────────────────────────────

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TidemarkError {
    /// Returns the category this error belongs to.
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::DuplicateVersion { .. } | Self::InvalidName(_) => ErrorCategory::Load,
            Self::UnknownStatementKind { .. } => ErrorCategory::Classify,
            Self::Connection(_) => ErrorCategory::Connection,
            Self::SchemaApply { .. } => ErrorCategory::SchemaApply,
            Self::DataApply { .. } => ErrorCategory::DataApply,
            Self::Timeout { .. } => ErrorCategory::Timeout,
            Self::Blocked { .. } => ErrorCategory::Blocked,
            Self::Aborted(_) | Self::StatementFailed { .. } | Self::Database(_) => {
                ErrorCategory::Database
            }
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Io(_) => ErrorCategory::Io,
        }
    }

    /// Returns `true` if the ledger is dirty after this error.
    ///
    /// Version 0 marks work outside the ledger (baseline loads and single
    /// file applies), which never leaves an entry behind.
    pub const fn is_dirty_condition(&self) -> bool {
        match self {
            Self::SchemaApply { version, .. }
            | Self::DataApply { version, .. }
            | Self::Timeout { version }
            | Self::Blocked { version } => *version != 0,
            _ => false,
        }
    }

    /// Returns `true` for errors the database client may succeed on if retried.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Aborted(_))
    }

    /// Returns the migration version this error refers to, if any.
    pub const fn version(&self) -> Option<u64> {
        match self {
            Self::DuplicateVersion { version, .. }
            | Self::SchemaApply { version, .. }
            | Self::DataApply { version, .. }
            | Self::Timeout { version }
            | Self::Blocked { version } => Some(*version),
            _ => None,
        }
    }

    /// Returns the process exit code a command-line front end should use.
    ///
    /// - `Load`, `Classify`, `Configuration` -> 2
    /// - `Blocked` -> 3
    /// - `SchemaApply`, `DataApply` -> 4
    /// - `Timeout` -> 5
    /// - `Connection` -> 6
    /// - Everything else -> 1
    pub const fn exit_code(&self) -> i32 {
        match self.category() {
            ErrorCategory::Load | ErrorCategory::Classify | ErrorCategory::Configuration => 2,
            ErrorCategory::Blocked => 3,
            ErrorCategory::SchemaApply | ErrorCategory::DataApply => 4,
            ErrorCategory::Timeout => 5,
            ErrorCategory::Connection => 6,
            ErrorCategory::Database | ErrorCategory::Io => 1,
        }
    }
}

/// A convenience type alias for `Result<T, TidemarkError>`.
pub type TidemarkResult<T> = Result<T, TidemarkError>;
