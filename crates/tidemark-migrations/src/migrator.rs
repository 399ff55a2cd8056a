//! The operations exposed to front ends.
//!
//! [`Migrator`] bundles a database, a [`Config`] and the ledger, and offers
//! one method per operation: `create`, `drop_all`, `reset`, `load`, `apply`,
//! `migrate`, `status`, `history`, `set_version` and `truncate`.

use std::path::Path;

use serde::Serialize;
use tokio::time::Instant;

use tidemark_core::{Config, TidemarkError};
use tidemark_db_backends::{Database, PartitionedOptions};

use crate::executor::{deadline_after, BatchReport, DataChangeMode, Executor};
use crate::ledger::{quote_ident, LedgerEntry, VersionLedger};
use crate::runner::{MigrateOptions, MigrateReport, MigrationRunner};
use crate::statement::{self, Batch, Statement, StatementKind};

/// Rows removed from one table by [`Migrator::truncate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TruncatedTable {
    /// The table name.
    pub table: String,
    /// Rows deleted, as reported by partitioned execution.
    pub rows_deleted: u64,
}

/// The result of [`Migrator::reset`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResetReport {
    /// Tables dropped, children first. Includes the ledger table.
    pub dropped: Vec<String>,
    /// Batches applied from the baseline schema.
    pub baseline: Vec<BatchReport>,
}

/// Entry point for running migration operations against one database.
pub struct Migrator<'a> {
    db: &'a dyn Database,
    config: &'a Config,
    ledger: VersionLedger,
}

impl<'a> Migrator<'a> {
    /// Creates a migrator using the ledger table named in `config`.
    pub fn new(db: &'a dyn Database, config: &'a Config) -> Self {
        Self {
            db,
            config,
            ledger: VersionLedger::new(config.migration_table.clone()),
        }
    }

    /// Returns the ledger.
    pub const fn ledger(&self) -> &VersionLedger {
        &self.ledger
    }

    fn executor(&self) -> Executor<'a> {
        Executor::new(self.db, self.config)
    }

    fn deadline(&self) -> Result<Instant, TidemarkError> {
        deadline_after(self.config.timeout())
    }

    /// Applies a baseline schema file without recording anything in the ledger.
    pub async fn load(&self, baseline: &Path) -> Result<Vec<BatchReport>, TidemarkError> {
        tracing::info!(path = %baseline.display(), "loading baseline schema");
        let mode = DataChangeMode::from_settings(&self.config.execution);
        self.apply_file(baseline, &mode).await
    }

    /// Applies the baseline schema to a database that has no tables yet.
    pub async fn create(&self, baseline: &Path) -> Result<Vec<BatchReport>, TidemarkError> {
        let existing = self.db.list_tables().await?;
        if !existing.is_empty() {
            return Err(TidemarkError::Configuration(format!(
                "Database '{}' already has {} table(s); use reset to recreate it",
                self.config.database.name,
                existing.len()
            )));
        }
        self.load(baseline).await
    }

    /// Drops every table, the ledger included, children first.
    ///
    /// All drops are submitted as one schema operation.
    pub async fn drop_all(&self) -> Result<Vec<String>, TidemarkError> {
        let tables = self.db.list_tables().await?;
        if tables.is_empty() {
            tracing::info!("no tables to drop");
            return Ok(tables);
        }
        let batch = Batch {
            kind: StatementKind::SchemaChange,
            statements: tables
                .iter()
                .enumerate()
                .map(|(index, table)| Statement {
                    kind: StatementKind::SchemaChange,
                    text: format!("DROP TABLE {}", quote_ident(table)),
                    index,
                })
                .collect(),
        };
        tracing::warn!(tables = tables.len(), "dropping all tables");
        self.executor()
            .apply_schema(0, &batch, self.deadline()?)
            .await?;
        Ok(tables)
    }

    /// Drops every table and applies the baseline schema again.
    ///
    /// The baseline is classified before anything is dropped. The ledger is
    /// empty afterwards; run `migrate` to bring the database up to date.
    pub async fn reset(&self, baseline: &Path) -> Result<ResetReport, TidemarkError> {
        let raw = std::fs::read_to_string(baseline)?;
        let batches = statement::batches(statement::classify(&raw)?);
        let dropped = self.drop_all().await?;
        let mode = DataChangeMode::from_settings(&self.config.execution);
        let baseline = self
            .executor()
            .apply_batches(0, &batches, &mode, self.deadline()?)
            .await?;
        Ok(ResetReport { dropped, baseline })
    }

    /// Applies a single file with the given data-change mode.
    ///
    /// The file name does not need to follow the migration naming convention
    /// and nothing is recorded in the ledger.
    pub async fn apply(
        &self,
        file: &Path,
        mode: &DataChangeMode,
    ) -> Result<Vec<BatchReport>, TidemarkError> {
        tracing::info!(path = %file.display(), partitioned = mode.is_partitioned(), "applying file");
        self.apply_file(file, mode).await
    }

    async fn apply_file(
        &self,
        file: &Path,
        mode: &DataChangeMode,
    ) -> Result<Vec<BatchReport>, TidemarkError> {
        let raw = std::fs::read_to_string(file)?;
        let batches = statement::batches(statement::classify(&raw)?);
        self.executor()
            .apply_batches(0, &batches, mode, self.deadline()?)
            .await
    }

    /// Applies every pending migration in `dir`.
    pub async fn migrate(
        &self,
        dir: &Path,
        options: &MigrateOptions,
    ) -> Result<MigrateReport, TidemarkError> {
        MigrationRunner::with_executor(&self.ledger, self.executor())
            .run(dir, options)
            .await
    }

    /// Returns the last recorded version and whether it is dirty.
    pub async fn status(&self) -> Result<(u64, bool), TidemarkError> {
        self.ledger.last_applied_version(self.db).await
    }

    /// Returns every ledger entry, ascending by version.
    pub async fn history(&self) -> Result<Vec<LedgerEntry>, TidemarkError> {
        self.ledger.entries(self.db).await
    }

    /// Writes the ledger entry for `version` without executing anything.
    pub async fn set_version(&self, version: u64, dirty: bool) -> Result<(), TidemarkError> {
        if version == 0 {
            return Err(TidemarkError::Configuration(
                "Version 0 cannot be recorded in the ledger".to_string(),
            ));
        }
        self.ledger
            .ensure_schema(&self.executor(), self.deadline()?)
            .await?;
        tracing::warn!(version, dirty, "forcing ledger entry");
        self.ledger.set_version(self.db, version, dirty).await
    }

    /// Deletes every row of every table except the ledger.
    ///
    /// Tables are emptied children first with partitioned execution.
    pub async fn truncate(&self) -> Result<Vec<TruncatedTable>, TidemarkError> {
        let tables: Vec<String> = self
            .db
            .list_tables()
            .await?
            .into_iter()
            .filter(|t| !t.eq_ignore_ascii_case(self.ledger.table()))
            .collect();
        if tables.is_empty() {
            tracing::info!("no tables to truncate");
            return Ok(Vec::new());
        }

        let options = PartitionedOptions::from(&self.config.execution);
        let executor = self.executor();
        let deadline = self.deadline()?;
        let mut truncated = Vec::with_capacity(tables.len());
        for (index, table) in tables.into_iter().enumerate() {
            let batch = Batch {
                kind: StatementKind::DataChange,
                statements: vec![Statement {
                    kind: StatementKind::DataChange,
                    text: format!("DELETE FROM {}", quote_ident(&table)),
                    index,
                }],
            };
            let rows_deleted = executor
                .apply_partitioned(0, &batch, &options, deadline)
                .await?;
            tracing::info!(table = %table, rows_deleted, "truncated table");
            truncated.push(TruncatedTable {
                table,
                rows_deleted,
            });
        }
        Ok(truncated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tidemark_db_backends::SqliteBackend;

    fn config() -> Config {
        Config {
            poll_interval_ms: 5,
            ..Config::default()
        }
    }

    async fn count(db: &SqliteBackend, table: &str) -> i64 {
        let rows = db
            .query(&format!("SELECT COUNT(*) AS n FROM \"{table}\""), &[])
            .await
            .unwrap();
        rows[0].get::<i64>("n").unwrap()
    }

    #[tokio::test]
    async fn test_load_baseline_does_not_touch_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.sql");
        fs::write(
            &path,
            "CREATE TABLE singers (id INTEGER PRIMARY KEY, name TEXT);\n\
             CREATE INDEX singers_name ON singers (name);",
        )
        .unwrap();

        let db = SqliteBackend::memory().unwrap();
        let config = config();
        let migrator = Migrator::new(&db, &config);
        let reports = migrator.load(&path).await.unwrap();
        assert_eq!(reports.len(), 1);
        assert!(db.table_exists("singers").await.unwrap());
        assert!(!migrator.ledger().exists(&db).await.unwrap());
        assert_eq!(migrator.status().await.unwrap(), (0, false));
    }

    #[tokio::test]
    async fn test_apply_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backfill.sql");
        fs::write(
            &path,
            "CREATE TABLE t (id INTEGER);\nINSERT INTO t VALUES (1);\nINSERT INTO t VALUES (2);",
        )
        .unwrap();

        let db = SqliteBackend::memory().unwrap();
        let config = config();
        let migrator = Migrator::new(&db, &config);
        let mode = DataChangeMode::Partitioned(PartitionedOptions::default());
        let reports = migrator.apply(&path, &mode).await.unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[1].rows_affected, 2);
        assert_eq!(count(&db, "t").await, 2);
        assert!(migrator.history().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_set_version_and_history() {
        let db = SqliteBackend::memory().unwrap();
        let config = config();
        let migrator = Migrator::new(&db, &config);

        migrator.set_version(4, true).await.unwrap();
        assert_eq!(migrator.status().await.unwrap(), (4, true));
        migrator.set_version(4, false).await.unwrap();
        assert_eq!(migrator.status().await.unwrap(), (4, false));

        let history = migrator.history().await.unwrap();
        assert_eq!(history.len(), 1);
        assert!(matches!(
            migrator.set_version(0, false).await,
            Err(TidemarkError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_create_refuses_non_empty_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.sql");
        fs::write(&path, "CREATE TABLE singers (id INTEGER PRIMARY KEY);").unwrap();

        let db = SqliteBackend::memory().unwrap();
        let config = config();
        let migrator = Migrator::new(&db, &config);
        migrator.create(&path).await.unwrap();
        assert!(db.table_exists("singers").await.unwrap());

        let err = migrator.create(&path).await.unwrap_err();
        assert!(matches!(err, TidemarkError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_drop_all_includes_ledger() {
        let db = SqliteBackend::memory().unwrap();
        let config = config();
        let migrator = Migrator::new(&db, &config);
        db.execute("CREATE TABLE parent (id INTEGER PRIMARY KEY)", &[])
            .await
            .unwrap();
        db.execute(
            "CREATE TABLE child (id INTEGER PRIMARY KEY, parent_id INTEGER REFERENCES parent (id))",
            &[],
        )
        .await
        .unwrap();
        db.execute("INSERT INTO parent VALUES (1)", &[]).await.unwrap();
        db.execute("INSERT INTO child VALUES (1, 1)", &[]).await.unwrap();
        migrator.set_version(3, false).await.unwrap();

        let dropped = migrator.drop_all().await.unwrap();
        assert_eq!(dropped.len(), 3);
        assert!(db.list_tables().await.unwrap().is_empty());
        assert_eq!(migrator.status().await.unwrap(), (0, false));
        assert!(migrator.drop_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reset_reloads_baseline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.sql");
        fs::write(
            &path,
            "CREATE TABLE singers (id INTEGER PRIMARY KEY);\nINSERT INTO singers VALUES (1);",
        )
        .unwrap();

        let db = SqliteBackend::memory().unwrap();
        let config = config();
        let migrator = Migrator::new(&db, &config);
        migrator.load(&path).await.unwrap();
        db.execute("CREATE TABLE extra (id INTEGER)", &[]).await.unwrap();
        db.execute("INSERT INTO singers VALUES (2)", &[]).await.unwrap();
        migrator.set_version(2, true).await.unwrap();

        let report = migrator.reset(&path).await.unwrap();
        assert_eq!(report.dropped.len(), 3);
        assert_eq!(report.baseline.len(), 2);
        assert!(!db.table_exists("extra").await.unwrap());
        assert_eq!(count(&db, "singers").await, 1);
        assert_eq!(migrator.status().await.unwrap(), (0, false));
    }

    #[tokio::test]
    async fn test_reset_checks_baseline_before_dropping() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.sql");
        fs::write(&path, "CREATE TABLE a (id INTEGER);\nSELECT 1;").unwrap();

        let db = SqliteBackend::memory().unwrap();
        let config = config();
        let migrator = Migrator::new(&db, &config);
        db.execute("CREATE TABLE keep (id INTEGER)", &[]).await.unwrap();

        let err = migrator.reset(&path).await.unwrap_err();
        assert!(matches!(err, TidemarkError::UnknownStatementKind { index: 1, .. }));
        assert!(db.table_exists("keep").await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_load_is_not_dirty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.sql");
        fs::write(&path, "CREATE TABLE a (id INTEGER);\nINSERT INTO missing VALUES (1);").unwrap();

        let db = SqliteBackend::memory().unwrap();
        let config = config();
        let err = Migrator::new(&db, &config).load(&path).await.unwrap_err();
        assert!(matches!(err, TidemarkError::DataApply { version: 0, statement_index: 1, .. }));
        assert!(!err.is_dirty_condition());
    }

    #[tokio::test]
    async fn test_unrepresentable_timeout_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.sql");
        fs::write(&path, "CREATE TABLE a (id INTEGER);").unwrap();

        let db = SqliteBackend::memory().unwrap();
        let mut config = config();
        config.timeout_secs = u64::MAX;
        let migrator = Migrator::new(&db, &config);
        assert!(matches!(
            migrator.load(&path).await,
            Err(TidemarkError::Configuration(_))
        ));
        assert!(matches!(
            migrator.set_version(1, false).await,
            Err(TidemarkError::Configuration(_))
        ));
        assert!(!db.table_exists("a").await.unwrap());
    }

    #[tokio::test]
    async fn test_truncate_keeps_ledger() {
        let db = SqliteBackend::memory().unwrap();
        let config = config();
        let migrator = Migrator::new(&db, &config);
        db.execute("CREATE TABLE parent (id INTEGER PRIMARY KEY)", &[])
            .await
            .unwrap();
        db.execute(
            "CREATE TABLE child (id INTEGER PRIMARY KEY, parent_id INTEGER REFERENCES parent (id))",
            &[],
        )
        .await
        .unwrap();
        db.execute("INSERT INTO parent VALUES (1)", &[]).await.unwrap();
        db.execute("INSERT INTO child VALUES (1, 1)", &[]).await.unwrap();
        migrator.set_version(1, false).await.unwrap();

        let truncated = migrator.truncate().await.unwrap();
        assert_eq!(
            truncated.iter().map(|t| t.table.as_str()).collect::<Vec<_>>(),
            vec!["child", "parent"]
        );
        assert_eq!(count(&db, "parent").await, 0);
        assert_eq!(count(&db, "child").await, 0);
        assert_eq!(migrator.status().await.unwrap(), (1, false));
    }
}
