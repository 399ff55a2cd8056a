//! The version ledger.
//!
//! The [`VersionLedger`] keeps one row per attempted migration version in a
//! table inside the target database:
//!
//! ```text
//! version     INTEGER   PRIMARY KEY
//! dirty       BOOLEAN   set while a version is being applied or after it failed
//! applied_at  TIMESTAMP when the entry was last written
//! ```
//!
//! All reads and writes go through the database's own statements; there is no
//! in-process locking. Concurrent runs against one database must be serialized
//! by the operator.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

use tidemark_core::config::DEFAULT_MIGRATION_TABLE;
use tidemark_core::TidemarkError;
use tidemark_db_backends::{Database, Value};

use crate::executor::Executor;
use crate::statement::{Batch, Statement, StatementKind};

/// One row of the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    /// The migration version.
    pub version: u64,
    /// Whether the version is unfinished or failed.
    pub dirty: bool,
    /// When the entry was last written.
    pub applied_at: DateTime<Utc>,
}

/// Bookkeeping of applied versions, stored in the target database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionLedger {
    table: String,
}

impl Default for VersionLedger {
    fn default() -> Self {
        Self::new(DEFAULT_MIGRATION_TABLE)
    }
}

impl VersionLedger {
    /// Creates a ledger stored in `table`.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
        }
    }

    /// Returns the ledger table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Returns the DDL creating the ledger table.
    pub fn ensure_schema_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\
                version INTEGER NOT NULL PRIMARY KEY, \
                dirty BOOLEAN NOT NULL, \
                applied_at TIMESTAMP NOT NULL\
            )",
            quote_ident(&self.table)
        )
    }

    /// Returns whether the ledger table exists.
    pub async fn exists(&self, db: &dyn Database) -> Result<bool, TidemarkError> {
        db.table_exists(&self.table).await
    }

    /// Creates the ledger table if it is absent.
    ///
    /// The DDL is applied as a schema batch through `executor`. Returns `true`
    /// if the table was created.
    pub async fn ensure_schema(
        &self,
        executor: &Executor<'_>,
        deadline: Instant,
    ) -> Result<bool, TidemarkError> {
        if self.exists(executor.database()).await? {
            return Ok(false);
        }
        tracing::info!(table = %self.table, "creating ledger table");
        let batch = Batch {
            kind: StatementKind::SchemaChange,
            statements: vec![Statement {
                kind: StatementKind::SchemaChange,
                text: self.ensure_schema_sql(),
                index: 0,
            }],
        };
        executor
            .apply_schema(0, &batch, deadline)
            .await
            .map_err(|e| match e {
                TidemarkError::SchemaApply { message, .. } => TidemarkError::Database(format!(
                    "Cannot create ledger table '{}': {message}",
                    self.table
                )),
                other => other,
            })?;
        Ok(true)
    }

    /// Returns the highest recorded version and its dirty flag, or `(0, false)`
    /// when the ledger is empty or missing.
    pub async fn last_applied_version(
        &self,
        db: &dyn Database,
    ) -> Result<(u64, bool), TidemarkError> {
        if !self.exists(db).await? {
            return Ok((0, false));
        }
        let sql = format!(
            "SELECT version, dirty FROM {} ORDER BY version DESC LIMIT 1",
            quote_ident(&self.table)
        );
        let rows = db.query(&sql, &[]).await?;
        match rows.first() {
            Some(row) => Ok((row.get::<u64>("version")?, row.get::<bool>("dirty")?)),
            None => Ok((0, false)),
        }
    }

    /// Returns the lowest dirty version, if any.
    pub async fn dirty_version(&self, db: &dyn Database) -> Result<Option<u64>, TidemarkError> {
        if !self.exists(db).await? {
            return Ok(None);
        }
        let sql = format!(
            "SELECT MIN(version) AS version FROM {} WHERE dirty",
            quote_ident(&self.table)
        );
        let rows = db.query(&sql, &[]).await?;
        match rows.first() {
            Some(row) => row.get::<Option<u64>>("version"),
            None => Ok(None),
        }
    }

    /// Returns every entry, ascending by version.
    pub async fn entries(&self, db: &dyn Database) -> Result<Vec<LedgerEntry>, TidemarkError> {
        if !self.exists(db).await? {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT version, dirty, applied_at FROM {} ORDER BY version ASC",
            quote_ident(&self.table)
        );
        db.query(&sql, &[])
            .await?
            .iter()
            .map(|row| -> Result<LedgerEntry, TidemarkError> {
                Ok(LedgerEntry {
                    version: row.get("version")?,
                    dirty: row.get("dirty")?,
                    applied_at: row.get("applied_at")?,
                })
            })
            .collect()
    }

    /// Writes a dirty entry for `version` before it is applied.
    ///
    /// A previous dirty entry for the same version is overwritten. Fails if
    /// the version is already recorded as applied.
    pub async fn begin_version(&self, db: &dyn Database, version: u64) -> Result<(), TidemarkError> {
        let table = quote_ident(&self.table);
        let sql = format!(
            "INSERT INTO {table} (version, dirty, applied_at) VALUES (?, ?, ?) \
             ON CONFLICT (version) DO UPDATE SET dirty = excluded.dirty, \
             applied_at = excluded.applied_at WHERE {table}.dirty"
        );
        let written = db
            .execute(&sql, &[version_param(version)?, Value::from(true), now()])
            .await?;
        if written == 0 {
            return Err(TidemarkError::Database(format!(
                "Version {version} is already recorded as applied"
            )));
        }
        Ok(())
    }

    /// Clears the dirty flag of `version` and stamps the applied time.
    pub async fn commit_version(&self, db: &dyn Database, version: u64) -> Result<(), TidemarkError> {
        let sql = format!(
            "UPDATE {} SET dirty = ?, applied_at = ? WHERE version = ?",
            quote_ident(&self.table)
        );
        let written = db
            .execute(&sql, &[Value::from(false), now(), version_param(version)?])
            .await?;
        if written == 0 {
            return Err(TidemarkError::Database(format!(
                "No ledger entry for version {version} to commit"
            )));
        }
        Ok(())
    }

    /// Marks `version` as dirty, creating the entry if needed.
    pub async fn mark_dirty(&self, db: &dyn Database, version: u64) -> Result<(), TidemarkError> {
        self.set_version(db, version, true).await
    }

    /// Writes or overwrites the entry for `version` with the given dirty flag.
    pub async fn set_version(
        &self,
        db: &dyn Database,
        version: u64,
        dirty: bool,
    ) -> Result<(), TidemarkError> {
        let sql = format!(
            "INSERT INTO {} (version, dirty, applied_at) VALUES (?, ?, ?) \
             ON CONFLICT (version) DO UPDATE SET dirty = excluded.dirty, \
             applied_at = excluded.applied_at",
            quote_ident(&self.table)
        );
        db.execute(&sql, &[version_param(version)?, Value::from(dirty), now()])
            .await?;
        Ok(())
    }
}

/// Quotes an identifier with double quotes.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn version_param(version: u64) -> Result<Value, TidemarkError> {
    i64::try_from(version)
        .map(Value::Int)
        .map_err(|_| TidemarkError::Database(format!("Version {version} exceeds the ledger range")))
}

fn now() -> Value {
    Value::Timestamp(Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tidemark_core::RetryPolicy;
    use tidemark_db_backends::SqliteBackend;

    async fn setup() -> (SqliteBackend, VersionLedger) {
        let db = SqliteBackend::memory().unwrap();
        let ledger = VersionLedger::default();
        let executor = Executor::with_settings(&db, Duration::from_millis(5), RetryPolicy::default());
        let deadline = Instant::now() + Duration::from_secs(30);
        assert!(ledger.ensure_schema(&executor, deadline).await.unwrap());
        (db, ledger)
    }

    #[test]
    fn test_ensure_schema_sql() {
        let sql = VersionLedger::new("my_ledger").ensure_schema_sql();
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"my_ledger\""));
        assert!(sql.contains("version INTEGER NOT NULL PRIMARY KEY"));
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("SchemaMigrations"), "\"SchemaMigrations\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }

    #[tokio::test]
    async fn test_missing_ledger_reads_as_empty() {
        let db = SqliteBackend::memory().unwrap();
        let ledger = VersionLedger::default();
        assert!(!ledger.exists(&db).await.unwrap());
        assert_eq!(ledger.last_applied_version(&db).await.unwrap(), (0, false));
        assert_eq!(ledger.dirty_version(&db).await.unwrap(), None);
        assert!(ledger.entries(&db).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ensure_schema_is_idempotent() {
        let (db, ledger) = setup().await;
        let executor = Executor::with_settings(&db, Duration::from_millis(5), RetryPolicy::default());
        let deadline = Instant::now() + Duration::from_secs(30);
        assert!(!ledger.ensure_schema(&executor, deadline).await.unwrap());
        assert_eq!(ledger.last_applied_version(&db).await.unwrap(), (0, false));
    }

    #[tokio::test]
    async fn test_begin_and_commit() {
        let (db, ledger) = setup().await;
        ledger.begin_version(&db, 1).await.unwrap();
        assert_eq!(ledger.last_applied_version(&db).await.unwrap(), (1, true));
        assert_eq!(ledger.dirty_version(&db).await.unwrap(), Some(1));

        ledger.commit_version(&db, 1).await.unwrap();
        assert_eq!(ledger.last_applied_version(&db).await.unwrap(), (1, false));
        assert_eq!(ledger.dirty_version(&db).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_begin_overwrites_dirty_entry() {
        let (db, ledger) = setup().await;
        ledger.mark_dirty(&db, 3).await.unwrap();
        ledger.begin_version(&db, 3).await.unwrap();
        let entries = ledger.entries(&db).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].dirty);
    }

    #[tokio::test]
    async fn test_begin_rejects_applied_version() {
        let (db, ledger) = setup().await;
        ledger.begin_version(&db, 2).await.unwrap();
        ledger.commit_version(&db, 2).await.unwrap();
        let err = ledger.begin_version(&db, 2).await.unwrap_err();
        assert!(matches!(err, TidemarkError::Database(_)));
        assert_eq!(ledger.last_applied_version(&db).await.unwrap(), (2, false));
    }

    #[tokio::test]
    async fn test_commit_without_entry() {
        let (db, ledger) = setup().await;
        assert!(ledger.commit_version(&db, 9).await.is_err());
    }

    #[tokio::test]
    async fn test_entries_ascending_and_set_version() {
        let (db, ledger) = setup().await;
        ledger.set_version(&db, 5, false).await.unwrap();
        ledger.set_version(&db, 2, false).await.unwrap();
        ledger.mark_dirty(&db, 7).await.unwrap();

        let entries = ledger.entries(&db).await.unwrap();
        assert_eq!(
            entries.iter().map(|e| (e.version, e.dirty)).collect::<Vec<_>>(),
            vec![(2, false), (5, false), (7, true)]
        );
        assert_eq!(ledger.last_applied_version(&db).await.unwrap(), (7, true));

        // Operator clears the dirty flag after a manual fix
        ledger.set_version(&db, 7, false).await.unwrap();
        assert_eq!(ledger.last_applied_version(&db).await.unwrap(), (7, false));
        assert_eq!(ledger.dirty_version(&db).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_custom_table_name() {
        let db = SqliteBackend::memory().unwrap();
        let ledger = VersionLedger::new("custom_versions");
        let executor = Executor::with_settings(&db, Duration::from_millis(5), RetryPolicy::default());
        ledger
            .ensure_schema(&executor, Instant::now() + Duration::from_secs(30))
            .await
            .unwrap();
        assert!(db.table_exists("custom_versions").await.unwrap());
        assert!(!db.table_exists(DEFAULT_MIGRATION_TABLE).await.unwrap());
    }

    #[test]
    fn test_version_param_range() {
        assert_eq!(version_param(4).unwrap(), Value::Int(4));
        assert!(version_param(u64::MAX).is_err());
    }
}
