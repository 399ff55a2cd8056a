//! SQLite database backend using `rusqlite`.
//!
//! This module provides the [`SqliteBackend`] which implements the
//! [`Database`](crate::base::Database) trait using `rusqlite` wrapped in
//! `tokio::task::spawn_blocking` for async compatibility.
//!
//! How the migration primitives map onto SQLite:
//! - Schema batches run on a background blocking task inside one transaction
//!   (SQLite DDL is transactional), observed through [`SqliteSchemaOperation`]
//! - `SQLITE_BUSY` and `SQLITE_LOCKED` are reported as aborted transactions
//! - Partitioned statements run in autocommit mode; SQLite has a single
//!   partition, so the priority and node hints are only logged

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use rusqlite::ErrorCode;
use tidemark_core::TidemarkError;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::base::{Database, OperationStatus, PartitionedOptions, SchemaOperation};
use crate::value::{Row, Value};

/// A SQLite database backend.
///
/// Uses `rusqlite` for database access with a `Mutex`-based concurrency
/// model. All operations are run via `tokio::task::spawn_blocking` to
/// avoid blocking the async runtime.
pub struct SqliteBackend {
    /// The path to the database file (or ":memory:").
    path: PathBuf,
    /// The connection, guarded by an async mutex.
    conn: Arc<Mutex<rusqlite::Connection>>,
}

impl SqliteBackend {
    /// Opens a new SQLite database at the given path.
    ///
    /// If the path is `:memory:`, an in-memory database is created.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, TidemarkError> {
        let path = path.into();
        let conn = if path.to_str() == Some(":memory:") {
            rusqlite::Connection::open_in_memory()
        } else {
            rusqlite::Connection::open(&path)
        }
        .map_err(|e| TidemarkError::Connection(format!("SQLite open failed: {e}")))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| TidemarkError::Connection(format!("Failed to set pragmas: {e}")))?;

        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens an in-memory database (convenience constructor).
    pub fn memory() -> Result<Self, TidemarkError> {
        Self::open(":memory:")
    }

    /// Returns the database file path.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Binds `Value`s to a `rusqlite` statement.
    fn bind_params(
        stmt: &mut rusqlite::Statement<'_>,
        params: &[Value],
    ) -> Result<(), TidemarkError> {
        for (i, param) in params.iter().enumerate() {
            let idx = i + 1;
            match param {
                Value::Null => stmt.raw_bind_parameter(idx, rusqlite::types::Null),
                Value::Bool(b) => stmt.raw_bind_parameter(idx, b),
                Value::Int(v) => stmt.raw_bind_parameter(idx, v),
                Value::Float(v) => stmt.raw_bind_parameter(idx, v),
                Value::String(s) => stmt.raw_bind_parameter(idx, s.as_str()),
                Value::Bytes(b) => stmt.raw_bind_parameter(idx, b.as_slice()),
                Value::Timestamp(ts) => stmt.raw_bind_parameter(idx, ts.to_rfc3339()),
            }
            .map_err(|e| TidemarkError::Database(format!("Bind error: {e}")))?;
        }
        Ok(())
    }

    /// Converts a `rusqlite::Row` to our generic `Row`.
    fn convert_row(sqlite_row: &rusqlite::Row<'_>, column_names: &[String]) -> Row {
        let values: Vec<Value> = (0..column_names.len())
            .map(|i| {
                let val_ref = sqlite_row
                    .get_ref(i)
                    .unwrap_or(rusqlite::types::ValueRef::Null);
                match val_ref {
                    rusqlite::types::ValueRef::Null => Value::Null,
                    rusqlite::types::ValueRef::Integer(v) => Value::Int(v),
                    rusqlite::types::ValueRef::Real(v) => Value::Float(v),
                    rusqlite::types::ValueRef::Text(b) => {
                        Value::String(String::from_utf8_lossy(b).to_string())
                    }
                    rusqlite::types::ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
                }
            })
            .collect();

        Row::new(column_names.to_vec(), values)
    }

    /// Runs `statements` in one transaction, rolling back on the first failure.
    fn run_in_transaction(
        conn: &mut rusqlite::Connection,
        statements: &[String],
    ) -> Result<u64, TidemarkError> {
        let tx = conn.transaction().map_err(classify_error)?;
        let mut rows = 0_u64;
        for (offset, sql) in statements.iter().enumerate() {
            let count = tx
                .execute(sql, [])
                .map_err(|e| statement_error(offset, e))?;
            rows += count as u64;
        }
        tx.commit().map_err(classify_error)?;
        Ok(rows)
    }

    /// Orders tables so that referencing tables come before referenced ones.
    fn tables_children_first(
        conn: &rusqlite::Connection,
    ) -> Result<Vec<String>, TidemarkError> {
        let mut stmt = conn
            .prepare(
                "SELECT name FROM sqlite_master \
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            )
            .map_err(classify_error)?;
        let names = stmt
            .query_map([], |r| r.get::<_, String>(0))
            .map_err(classify_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(classify_error)?;

        let mut parents: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for name in &names {
            let mut fk = conn
                .prepare(&format!("PRAGMA foreign_key_list({})", quote_ident(name)))
                .map_err(classify_error)?;
            let refs = fk
                .query_map([], |r| r.get::<_, String>(2))
                .map_err(classify_error)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(classify_error)?;
            parents.insert(name.clone(), refs);
        }

        // Post-order over parents yields parents first; reverse for children first.
        let mut seen = HashSet::new();
        let mut ordered = Vec::with_capacity(names.len());
        for name in &names {
            visit_parents_first(name, &parents, &mut seen, &mut ordered);
        }
        ordered.reverse();
        Ok(ordered)
    }
}

/// Depth-first walk that emits a table after every table it references.
fn visit_parents_first(
    name: &str,
    parents: &BTreeMap<String, Vec<String>>,
    seen: &mut HashSet<String>,
    out: &mut Vec<String>,
) {
    if !seen.insert(name.to_string()) {
        return;
    }
    if let Some(refs) = parents.get(name) {
        for parent in refs {
            if parent != name {
                visit_parents_first(parent, parents, seen, out);
            }
        }
    }
    if parents.contains_key(name) {
        out.push(name.to_string());
    }
}

/// Quotes an identifier for interpolation into SQLite statements.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Maps a `rusqlite` error onto the tidemark taxonomy.
fn classify_error(e: rusqlite::Error) -> TidemarkError {
    match e.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
            TidemarkError::Aborted(e.to_string())
        }
        Some(ErrorCode::CannotOpen | ErrorCode::NotADatabase) => {
            TidemarkError::Connection(e.to_string())
        }
        _ => TidemarkError::Database(e.to_string()),
    }
}

/// Maps a failure of the statement at `offset` within a batch.
fn statement_error(offset: usize, e: rusqlite::Error) -> TidemarkError {
    match classify_error(e) {
        TidemarkError::Database(message) => TidemarkError::StatementFailed { offset, message },
        other => other,
    }
}

fn join_error(e: &tokio::task::JoinError) -> TidemarkError {
    TidemarkError::Database(format!("Task join error: {e}"))
}

/// A schema batch running on a blocking task.
pub struct SqliteSchemaOperation {
    id: String,
    handle: Option<JoinHandle<Result<u64, TidemarkError>>>,
}

#[async_trait::async_trait]
impl SchemaOperation for SqliteSchemaOperation {
    fn id(&self) -> &str {
        &self.id
    }

    async fn poll(&mut self) -> Result<OperationStatus, TidemarkError> {
        match self.handle.take() {
            None => Ok(OperationStatus::Done),
            Some(handle) if !handle.is_finished() => {
                self.handle = Some(handle);
                Ok(OperationStatus::Pending)
            }
            Some(handle) => {
                handle.await.map_err(|e| join_error(&e))??;
                Ok(OperationStatus::Done)
            }
        }
    }
}

#[async_trait::async_trait]
impl Database for SqliteBackend {
    fn vendor(&self) -> &str {
        "sqlite"
    }

    async fn update_schema(
        &self,
        statements: Vec<String>,
    ) -> Result<Box<dyn SchemaOperation>, TidemarkError> {
        let conn = self.conn.clone();
        let id = format!("sqlite-ddl-{}", uuid::Uuid::new_v4());
        tracing::debug!(operation = %id, statements = statements.len(), "submitting schema batch");

        let handle = tokio::task::spawn_blocking(move || {
            let mut conn = conn.blocking_lock();
            Self::run_in_transaction(&mut conn, &statements)
        });

        Ok(Box::new(SqliteSchemaOperation {
            id,
            handle: Some(handle),
        }))
    }

    async fn run_transaction(&self, statements: &[String]) -> Result<u64, TidemarkError> {
        let conn = self.conn.clone();
        let statements = statements.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut conn = conn.blocking_lock();
            Self::run_in_transaction(&mut conn, &statements)
        })
        .await
        .map_err(|e| join_error(&e))?
    }

    async fn run_partitioned(
        &self,
        statement: &str,
        options: &PartitionedOptions,
    ) -> Result<u64, TidemarkError> {
        tracing::debug!(
            priority = options.priority.as_str(),
            node_count = ?options.node_count,
            "running partitioned statement on a single SQLite partition"
        );
        let conn = self.conn.clone();
        let sql = statement.to_string();

        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let count = conn.execute(&sql, []).map_err(|e| statement_error(0, e))?;
            Ok(count as u64)
        })
        .await
        .map_err(|e| join_error(&e))?
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, TidemarkError> {
        let conn = self.conn.clone();
        let sql = sql.to_string();
        let params = params.to_vec();

        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let mut stmt = conn.prepare(&sql).map_err(classify_error)?;
            Self::bind_params(&mut stmt, &params)?;
            let count = stmt.raw_execute().map_err(classify_error)?;
            Ok(count as u64)
        })
        .await
        .map_err(|e| join_error(&e))?
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, TidemarkError> {
        let conn = self.conn.clone();
        let sql = sql.to_string();
        let params = params.to_vec();

        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let mut stmt = conn.prepare(&sql).map_err(classify_error)?;

            let column_names: Vec<String> = stmt
                .column_names()
                .into_iter()
                .map(String::from)
                .collect();

            Self::bind_params(&mut stmt, &params)?;

            let mut raw_rows = stmt.raw_query();
            let mut rows = Vec::new();
            while let Some(row) = raw_rows.next().map_err(classify_error)? {
                rows.push(Self::convert_row(row, &column_names));
            }

            Ok(rows)
        })
        .await
        .map_err(|e| join_error(&e))?
    }

    async fn table_exists(&self, table: &str) -> Result<bool, TidemarkError> {
        let rows = self
            .query(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?",
                &[Value::from(table)],
            )
            .await?;
        Ok(!rows.is_empty())
    }

    async fn list_tables(&self) -> Result<Vec<String>, TidemarkError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            Self::tables_children_first(&conn)
        })
        .await
        .map_err(|e| join_error(&e))?
    }
}
