//! Batch execution engine.
//!
//! The [`Executor`] applies one [`Batch`] at a time against a
//! [`Database`]:
//!
//! - **Schema changes** are submitted as a single schema operation and polled
//!   until the database reports completion or failure.
//! - **Data changes** run either inside one read-write transaction, retried on
//!   contention with the configured [`RetryPolicy`], or statement by statement
//!   with partitioned execution.
//!
//! ## Deadlines
//!
//! Every call takes a deadline. When it expires, local waiting stops and the
//! call fails with [`TidemarkError::Timeout`]. The remote operation is not
//! cancelled and may still complete, so callers must treat a timeout as a dirty
//! condition.
//!
//! ## Errors
//!
//! Every failure other than a timeout is reported as
//! [`TidemarkError::SchemaApply`] or [`TidemarkError::DataApply`] carrying the
//! migration version and the index of the failing statement within the
//! migration.

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use tidemark_core::config::ExecutionSettings;
use tidemark_core::{Config, RetryPolicy, TidemarkError};
use tidemark_db_backends::{Database, OperationStatus, PartitionedOptions, SchemaOperation};

use crate::statement::{Batch, StatementKind};

/// How data-change batches are executed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DataChangeMode {
    /// All statements of a batch in one read-write transaction.
    #[default]
    Transactional,
    /// Each statement on its own with partitioned execution. Not atomic.
    Partitioned(PartitionedOptions),
}

impl DataChangeMode {
    /// Selects the mode requested by the operator's execution settings.
    pub fn from_settings(settings: &ExecutionSettings) -> Self {
        if settings.partitioned {
            Self::Partitioned(PartitionedOptions::from(settings))
        } else {
            Self::Transactional
        }
    }

    /// Returns `true` for partitioned execution.
    pub const fn is_partitioned(&self) -> bool {
        matches!(self, Self::Partitioned(_))
    }
}

/// The outcome of one applied batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// The batch's statement kind.
    pub kind: StatementKind,
    /// Number of statements in the batch.
    pub statements: usize,
    /// Rows affected by data changes; always 0 for schema changes. A lower
    /// bound for partitioned execution.
    pub rows_affected: u64,
}

/// Polling state of a schema batch.
enum SchemaStep {
    Submit,
    Poll(Box<dyn SchemaOperation>),
    Done,
}

/// Applies statement batches to a database.
pub struct Executor<'a> {
    db: &'a dyn Database,
    poll_interval: Duration,
    retry: RetryPolicy,
}

impl<'a> Executor<'a> {
    /// Creates an executor using the poll interval and retry policy of `config`.
    pub fn new(db: &'a dyn Database, config: &Config) -> Self {
        Self::with_settings(db, config.poll_interval(), config.retry.clone())
    }

    /// Creates an executor with explicit settings.
    pub fn with_settings(db: &'a dyn Database, poll_interval: Duration, retry: RetryPolicy) -> Self {
        Self {
            db,
            poll_interval,
            retry,
        }
    }

    /// Returns the target database.
    pub fn database(&self) -> &'a dyn Database {
        self.db
    }

    /// Applies batches in order, stopping at the first failure.
    pub async fn apply_batches(
        &self,
        version: u64,
        batches: &[Batch],
        mode: &DataChangeMode,
        deadline: Instant,
    ) -> Result<Vec<BatchReport>, TidemarkError> {
        let mut reports = Vec::with_capacity(batches.len());
        for batch in batches {
            reports.push(self.apply_batch(version, batch, mode, deadline).await?);
        }
        Ok(reports)
    }

    /// Applies one batch, routing it by kind and mode.
    pub async fn apply_batch(
        &self,
        version: u64,
        batch: &Batch,
        mode: &DataChangeMode,
        deadline: Instant,
    ) -> Result<BatchReport, TidemarkError> {
        tracing::debug!(
            version,
            kind = %batch.kind,
            statements = batch.len(),
            first_index = batch.first_index(),
            "applying batch"
        );
        if Instant::now() >= deadline {
            return Err(TidemarkError::Timeout { version });
        }
        let rows_affected = match (batch.kind, mode) {
            (StatementKind::SchemaChange, _) => {
                self.apply_schema(version, batch, deadline).await?;
                0
            }
            (StatementKind::DataChange, DataChangeMode::Transactional) => {
                self.apply_transactional(version, batch, deadline).await?
            }
            (StatementKind::DataChange, DataChangeMode::Partitioned(options)) => {
                self.apply_partitioned(version, batch, options, deadline)
                    .await?
            }
        };
        Ok(BatchReport {
            kind: batch.kind,
            statements: batch.len(),
            rows_affected,
        })
    }

    /// Submits a schema batch and polls it until it finishes or the deadline
    /// expires.
    pub async fn apply_schema(
        &self,
        version: u64,
        batch: &Batch,
        deadline: Instant,
    ) -> Result<(), TidemarkError> {
        let mut step = SchemaStep::Submit;
        loop {
            step = match step {
                SchemaStep::Submit => {
                    let op = tokio::time::timeout_at(deadline, self.db.update_schema(batch.texts()))
                        .await
                        .map_err(|_| TidemarkError::Timeout { version })?
                        .map_err(|e| apply_error(version, batch, e))?;
                    tracing::debug!(version, operation = op.id(), "schema operation submitted");
                    SchemaStep::Poll(op)
                }
                SchemaStep::Poll(mut op) => {
                    let status = tokio::time::timeout_at(deadline, op.poll())
                        .await
                        .map_err(|_| TidemarkError::Timeout { version })?
                        .map_err(|e| apply_error(version, batch, e))?;
                    match status {
                        OperationStatus::Done => SchemaStep::Done,
                        OperationStatus::Pending => {
                            let now = Instant::now();
                            if now >= deadline {
                                tracing::warn!(
                                    version,
                                    operation = op.id(),
                                    "deadline expired while schema operation is pending"
                                );
                                return Err(TidemarkError::Timeout { version });
                            }
                            let wake = now
                                .checked_add(self.poll_interval)
                                .map_or(deadline, |t| t.min(deadline));
                            tokio::time::sleep_until(wake).await;
                            SchemaStep::Poll(op)
                        }
                    }
                }
                SchemaStep::Done => return Ok(()),
            };
        }
    }

    /// Runs a data batch in one transaction, retrying aborted attempts.
    pub async fn apply_transactional(
        &self,
        version: u64,
        batch: &Batch,
        deadline: Instant,
    ) -> Result<u64, TidemarkError> {
        let texts = batch.texts();
        let mut attempt = 1;
        loop {
            let result = tokio::time::timeout_at(deadline, self.db.run_transaction(&texts))
                .await
                .map_err(|_| TidemarkError::Timeout { version })?;
            match result {
                Ok(rows) => return Ok(rows),
                Err(TidemarkError::Aborted(message)) if attempt < self.retry.max_attempts => {
                    let backoff = self.retry.backoff(attempt);
                    tracing::warn!(
                        version,
                        attempt,
                        backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                        "transaction aborted, retrying: {message}"
                    );
                    let resume = Instant::now().checked_add(backoff);
                    if !matches!(resume, Some(t) if t < deadline) {
                        return Err(TidemarkError::Timeout { version });
                    }
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(apply_error(version, batch, e)),
            }
        }
    }

    /// Runs each statement of a data batch with partitioned execution.
    ///
    /// Statements that already ran are not undone when a later one fails.
    pub async fn apply_partitioned(
        &self,
        version: u64,
        batch: &Batch,
        options: &PartitionedOptions,
        deadline: Instant,
    ) -> Result<u64, TidemarkError> {
        let mut total = 0;
        for (offset, statement) in batch.statements.iter().enumerate() {
            let rows = tokio::time::timeout_at(
                deadline,
                self.db.run_partitioned(&statement.text, options),
            )
            .await
            .map_err(|_| TidemarkError::Timeout { version })?
            .map_err(|e| {
                let e = match e {
                    TidemarkError::StatementFailed { message, .. } => {
                        TidemarkError::StatementFailed { offset, message }
                    }
                    other => other,
                };
                apply_error(version, batch, e)
            })?;
            tracing::debug!(version, index = statement.index, rows, "partitioned statement done");
            total += rows;
        }
        Ok(total)
    }
}

/// Returns the instant `timeout` from now.
///
/// Timeouts too large to represent are rejected instead of overflowing.
pub fn deadline_after(timeout: Duration) -> Result<Instant, TidemarkError> {
    Instant::now().checked_add(timeout).ok_or_else(|| {
        TidemarkError::Configuration(format!(
            "timeout of {}s is too large",
            timeout.as_secs()
        ))
    })
}

/// Converts a backend error into the apply error for `batch`.
fn apply_error(version: u64, batch: &Batch, err: TidemarkError) -> TidemarkError {
    let (statement_index, message) = match err {
        TidemarkError::Timeout { .. } => return TidemarkError::Timeout { version },
        TidemarkError::StatementFailed { offset, message } => (
            batch
                .statements
                .get(offset)
                .map_or_else(|| batch.first_index(), |s| s.index),
            message,
        ),
        other => (batch.first_index(), other.to_string()),
    };
    match batch.kind {
        StatementKind::SchemaChange => TidemarkError::SchemaApply {
            version,
            statement_index,
            message,
        },
        StatementKind::DataChange => TidemarkError::DataApply {
            version,
            statement_index,
            message,
        },
    }
}
