//! Shared fixtures for the integration tests.
//!
//! [`RecordingDatabase`] wraps an in-memory SQLite backend, records every call
//! the executor and ledger make, and can inject failures, aborts and stalled
//! schema operations.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tidemark_core::{Config, TidemarkError};
use tidemark_db_backends::{
    Database, OperationStatus, PartitionedOptions, Row, SchemaOperation, SqliteBackend, Value,
};

/// One recorded call against the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    UpdateSchema(Vec<String>),
    Transaction(Vec<String>),
    Partitioned(String, PartitionedOptions),
    Execute(String),
}

impl Call {
    /// Returns `true` for calls made by the executor.
    pub const fn is_executor_call(&self) -> bool {
        !matches!(self, Self::Execute(_))
    }
}

pub struct RecordingDatabase {
    inner: SqliteBackend,
    calls: Mutex<Vec<Call>>,
    fail_on: Mutex<Option<String>>,
    stall_on: Mutex<Option<String>>,
    aborts_left: AtomicUsize,
}

impl RecordingDatabase {
    pub fn new() -> Self {
        Self {
            inner: SqliteBackend::memory().unwrap(),
            calls: Mutex::new(Vec::new()),
            fail_on: Mutex::new(None),
            stall_on: Mutex::new(None),
            aborts_left: AtomicUsize::new(0),
        }
    }

    /// Fails any executed statement containing `marker`.
    pub fn fail_on(&self, marker: &str) {
        *self.fail_on.lock().unwrap() = Some(marker.to_string());
    }

    /// Keeps schema operations, transactions and partitioned statements
    /// containing `marker` pending forever.
    pub fn stall_on(&self, marker: &str) {
        *self.stall_on.lock().unwrap() = Some(marker.to_string());
    }

    /// Aborts the next `count` transactions with a contention error.
    pub fn abort_next_transactions(&self, count: usize) {
        self.aborts_left.store(count, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn executor_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(Call::is_executor_call)
            .collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn inner(&self) -> &SqliteBackend {
        &self.inner
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn failing_offset(&self, statements: &[String]) -> Option<usize> {
        let marker = self.fail_on.lock().unwrap().clone()?;
        statements.iter().position(|s| s.contains(&marker))
    }

    fn stalls(&self, statements: &[String]) -> bool {
        self.stall_on
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|marker| statements.iter().any(|s| s.contains(marker)))
    }
}

struct StalledOperation;

#[async_trait::async_trait]
impl SchemaOperation for StalledOperation {
    fn id(&self) -> &str {
        "stalled"
    }

    async fn poll(&mut self) -> Result<OperationStatus, TidemarkError> {
        Ok(OperationStatus::Pending)
    }
}

struct FailedOperation {
    offset: usize,
    polls: usize,
}

#[async_trait::async_trait]
impl SchemaOperation for FailedOperation {
    fn id(&self) -> &str {
        "failed"
    }

    async fn poll(&mut self) -> Result<OperationStatus, TidemarkError> {
        // Report progress once before failing, like a remote operation would
        self.polls += 1;
        if self.polls == 1 {
            return Ok(OperationStatus::Pending);
        }
        Err(TidemarkError::StatementFailed {
            offset: self.offset,
            message: "injected schema failure".to_string(),
        })
    }
}

#[async_trait::async_trait]
impl Database for RecordingDatabase {
    fn vendor(&self) -> &str {
        "recording"
    }

    async fn update_schema(
        &self,
        statements: Vec<String>,
    ) -> Result<Box<dyn SchemaOperation>, TidemarkError> {
        self.record(Call::UpdateSchema(statements.clone()));
        if self.stalls(&statements) {
            return Ok(Box::new(StalledOperation));
        }
        if let Some(offset) = self.failing_offset(&statements) {
            return Ok(Box::new(FailedOperation { offset, polls: 0 }));
        }
        self.inner.update_schema(statements).await
    }

    async fn run_transaction(&self, statements: &[String]) -> Result<u64, TidemarkError> {
        self.record(Call::Transaction(statements.to_vec()));
        let aborted = self
            .aborts_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if aborted {
            return Err(TidemarkError::Aborted("injected contention".to_string()));
        }
        if self.stalls(statements) {
            return std::future::pending().await;
        }
        if let Some(offset) = self.failing_offset(statements) {
            return Err(TidemarkError::StatementFailed {
                offset,
                message: "injected data failure".to_string(),
            });
        }
        self.inner.run_transaction(statements).await
    }

    async fn run_partitioned(
        &self,
        statement: &str,
        options: &PartitionedOptions,
    ) -> Result<u64, TidemarkError> {
        self.record(Call::Partitioned(statement.to_string(), *options));
        if self.stalls(&[statement.to_string()]) {
            return std::future::pending().await;
        }
        if self.failing_offset(&[statement.to_string()]).is_some() {
            return Err(TidemarkError::StatementFailed {
                offset: 0,
                message: "injected partitioned failure".to_string(),
            });
        }
        self.inner.run_partitioned(statement, options).await
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, TidemarkError> {
        self.record(Call::Execute(sql.to_string()));
        self.inner.execute(sql, params).await
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, TidemarkError> {
        self.inner.query(sql, params).await
    }

    async fn table_exists(&self, table: &str) -> Result<bool, TidemarkError> {
        self.inner.table_exists(table).await
    }

    async fn list_tables(&self) -> Result<Vec<String>, TidemarkError> {
        self.inner.list_tables().await
    }
}

/// A configuration with fast polling and retries.
pub fn test_config() -> Config {
    let mut config = Config {
        poll_interval_ms: 5,
        ..Config::default()
    };
    config.retry.initial_backoff_ms = 1;
    config.retry.max_backoff_ms = 5;
    config
}

/// Writes a migration file into `dir`.
pub fn write_migration(dir: &Path, name: &str, content: &str) {
    std::fs::write(dir.join(name), content).unwrap();
}

pub const SHORT_TIMEOUT: Duration = Duration::from_millis(200);
