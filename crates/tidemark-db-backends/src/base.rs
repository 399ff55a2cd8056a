//! Base database trait and common types.
//!
//! This module defines the [`Database`] trait that every backend implements,
//! along with the [`SchemaOperation`] handle returned for schema batches.
//!
//! Schema changes on a distributed database are long-running remote
//! operations: submitting them returns immediately and the caller polls the
//! handle until it reports [`OperationStatus::Done`] or an error. Giving up on
//! a handle (for example when a deadline expires) stops local waiting only;
//! the remote operation may still complete.

use tidemark_core::config::{ExecutionSettings, Priority};
use tidemark_core::TidemarkError;

use crate::value::{Row, Value};

/// Hints passed along with a partitioned data-change statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartitionedOptions {
    /// Request priority.
    pub priority: Priority,
    /// Upper bound on workers the database may use for this statement.
    pub node_count: Option<u32>,
}

impl From<&ExecutionSettings> for PartitionedOptions {
    fn from(settings: &ExecutionSettings) -> Self {
        Self {
            priority: settings.priority,
            node_count: settings.node_count,
        }
    }
}

/// Progress of a submitted schema operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationStatus {
    /// The operation is still running remotely.
    Pending,
    /// Every statement in the batch has been applied.
    Done,
}

/// A handle to an in-flight schema-change batch.
///
/// A failed batch surfaces as an error from [`poll`](SchemaOperation::poll),
/// normally [`TidemarkError::StatementFailed`] carrying the offset of the
/// failing statement within the batch.
#[async_trait::async_trait]
pub trait SchemaOperation: Send {
    /// Returns an identifier for logging.
    fn id(&self) -> &str;

    /// Checks the operation's progress without blocking.
    async fn poll(&mut self) -> Result<OperationStatus, TidemarkError>;
}

/// The core trait for target databases.
///
/// All methods are async because database operations are I/O-bound. Backends
/// built on synchronous drivers wrap their work in `spawn_blocking`.
///
/// Errors are classified so callers can react: [`TidemarkError::Connection`]
/// for unreachable databases, [`TidemarkError::Aborted`] for contention that a
/// transaction retry may resolve, [`TidemarkError::StatementFailed`] for a
/// statement rejected inside a batch, and [`TidemarkError::Database`] for the
/// rest.
#[async_trait::async_trait]
pub trait Database: Send + Sync {
    /// Returns the vendor name (e.g. "sqlite").
    fn vendor(&self) -> &str;

    /// Submits schema-change statements as one remote operation.
    async fn update_schema(
        &self,
        statements: Vec<String>,
    ) -> Result<Box<dyn SchemaOperation>, TidemarkError>;

    /// Runs data-change statements inside a single read-write transaction.
    ///
    /// Makes exactly one attempt. Returns the total number of rows affected.
    async fn run_transaction(&self, statements: &[String]) -> Result<u64, TidemarkError>;

    /// Runs one data-change statement with partitioned execution.
    ///
    /// The statement is not atomic across partitions and must be idempotent.
    /// Returns a lower bound on the number of rows affected.
    async fn run_partitioned(
        &self,
        statement: &str,
        options: &PartitionedOptions,
    ) -> Result<u64, TidemarkError>;

    /// Executes a single parameterized statement that does not return rows.
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, TidemarkError>;

    /// Executes a single parameterized query and returns all rows.
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, TidemarkError>;

    /// Returns whether a table with the given name exists.
    async fn table_exists(&self, table: &str) -> Result<bool, TidemarkError>;

    /// Lists user tables, ordered so that every table precedes the tables it
    /// references.
    async fn list_tables(&self) -> Result<Vec<String>, TidemarkError>;
}
