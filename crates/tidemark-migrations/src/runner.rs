//! The migration runner.
//!
//! [`MigrationRunner`] drives one `migrate` run through an explicit state
//! machine:
//!
//! ```text
//! Idle -> Loading -> Checking -> Applying(v) -> Recording(v) -> Applying(next) ... -> Done
//!            |           |  |         |
//!            v           |  v         v
//!        Rejected <------+ Blocked(v) Failed(v)
//! ```
//!
//! `Rejected` ends a run that failed before any version was started (an
//! unreadable directory, an unclassifiable file, a ledger that cannot be read
//! or created). A preloaded set passed to
//! [`MigrationRunner::run_migrations`] enters at `Checking`.
//!
//! Migrations are applied strictly one after another. Every pending file is
//! read and classified before the database is touched, so loading and
//! classification errors never leave partial state behind. Once a version has
//! been started, any failure marks it dirty and ends the run.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::Instrument;

use tidemark_core::logging::migration_span;
use tidemark_core::{Config, TidemarkError};
use tidemark_db_backends::Database;

use crate::executor::{deadline_after, BatchReport, DataChangeMode, Executor};
use crate::ledger::VersionLedger;
use crate::loader::{MigrationLoader, Migrations};
use crate::statement::{self, Batch};

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Nothing has happened yet.
    Idle,
    /// Scanning the migrations directory.
    Loading,
    /// Reading the ledger and preparing pending migrations.
    Checking,
    /// Applying the batches of a version.
    Applying(u64),
    /// Recording a fully applied version in the ledger.
    Recording(u64),
    /// Every pending migration was applied.
    Done,
    /// The ledger was dirty at start; nothing was applied.
    Blocked(u64),
    /// A version failed and was marked dirty.
    Failed(u64),
    /// The run stopped before any version was started.
    Rejected,
}

impl RunState {
    /// Returns `true` once the run has ended.
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Done | Self::Blocked(_) | Self::Failed(_) | Self::Rejected
        )
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Loading => write!(f, "loading"),
            Self::Checking => write!(f, "checking"),
            Self::Applying(v) => write!(f, "applying({v})"),
            Self::Recording(v) => write!(f, "recording({v})"),
            Self::Done => write!(f, "done"),
            Self::Blocked(v) => write!(f, "blocked({v})"),
            Self::Failed(v) => write!(f, "failed({v})"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// Options of a single `migrate` run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrateOptions {
    /// Execution mode for data changes.
    pub mode: DataChangeMode,
    /// Deadline for the whole run, measured from its start.
    pub timeout: Duration,
    /// Apply at most this many pending migrations.
    pub limit: Option<usize>,
}

impl MigrateOptions {
    /// Builds options from the run configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            mode: DataChangeMode::from_settings(&config.execution),
            timeout: config.timeout(),
            limit: None,
        }
    }

    /// Sets the maximum number of migrations to apply.
    #[must_use]
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }
}

/// A migration applied during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedMigration {
    /// The migration version.
    pub version: u64,
    /// The migration name.
    pub name: String,
    /// One report per executed batch.
    pub batches: Vec<BatchReport>,
}

/// The result of a successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrateReport {
    /// The last applied version before the run.
    pub previous_version: u64,
    /// The last applied version after the run.
    pub current_version: u64,
    /// Migrations applied by this run, in order.
    pub applied: Vec<AppliedMigration>,
}

impl MigrateReport {
    /// Returns `true` if nothing was applied.
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }
}

/// A pending migration, read and classified.
struct Prepared {
    version: u64,
    name: String,
    batches: Vec<Batch>,
}

/// Applies pending migrations in version order.
pub struct MigrationRunner<'a> {
    ledger: &'a VersionLedger,
    executor: Executor<'a>,
    state: RunState,
}

impl<'a> MigrationRunner<'a> {
    /// Creates a runner against `db`, recording into `ledger`.
    pub fn new(db: &'a dyn Database, ledger: &'a VersionLedger, config: &Config) -> Self {
        Self {
            ledger,
            executor: Executor::new(db, config),
            state: RunState::Idle,
        }
    }

    /// Creates a runner with a preconfigured executor.
    pub const fn with_executor(ledger: &'a VersionLedger, executor: Executor<'a>) -> Self {
        Self {
            ledger,
            executor,
            state: RunState::Idle,
        }
    }

    /// Returns the current state.
    pub const fn state(&self) -> RunState {
        self.state
    }

    fn transition(&mut self, next: RunState) {
        tracing::debug!(from = %self.state, to = %next, "runner state");
        self.state = next;
    }

    /// Loads the migrations in `dir` and applies the pending ones.
    pub async fn run(
        &mut self,
        dir: &Path,
        options: &MigrateOptions,
    ) -> Result<MigrateReport, TidemarkError> {
        self.transition(RunState::Loading);
        let migrations = match MigrationLoader::new(dir).load() {
            Ok(migrations) => migrations,
            Err(e) => {
                self.transition(RunState::Rejected);
                return Err(e);
            }
        };
        tracing::info!(
            dir = %dir.display(),
            count = migrations.len(),
            "loaded migrations"
        );
        self.run_migrations(&migrations, options).await
    }

    /// Applies the pending migrations from an already loaded set.
    ///
    /// Every error leaves the runner in a terminal state.
    pub async fn run_migrations(
        &mut self,
        migrations: &Migrations,
        options: &MigrateOptions,
    ) -> Result<MigrateReport, TidemarkError> {
        let result = self.check_and_apply(migrations, options).await;
        if result.is_err() && !self.state.is_terminal() {
            self.transition(RunState::Rejected);
        }
        result
    }

    async fn check_and_apply(
        &mut self,
        migrations: &Migrations,
        options: &MigrateOptions,
    ) -> Result<MigrateReport, TidemarkError> {
        let deadline = deadline_after(options.timeout)?;
        let db = self.executor.database();

        self.transition(RunState::Checking);
        let entries = self.ledger.entries(db).await?;
        if let Some(dirty) = entries.iter().find(|e| e.dirty) {
            tracing::warn!(
                version = dirty.version,
                "ledger has a dirty entry; resolve it and clear the flag before migrating"
            );
            self.transition(RunState::Blocked(dirty.version));
            return Err(TidemarkError::Blocked {
                version: dirty.version,
            });
        }
        let last_applied = entries.last().map_or(0, |e| e.version);
        for file in migrations.files() {
            let recorded = entries
                .binary_search_by_key(&file.version, |e| e.version)
                .is_ok();
            if file.version < last_applied && !recorded {
                tracing::warn!(
                    version = file.version,
                    last_applied,
                    path = %file.path.display(),
                    "migration is older than the last applied version and will not be applied"
                );
            }
        }

        let pending = migrations.after(last_applied);
        let pending = &pending[..options.limit.map_or(pending.len(), |n| n.min(pending.len()))];
        let prepared = pending
            .iter()
            .map(|file| -> Result<Prepared, TidemarkError> {
                let migration = file.read()?;
                let statements = statement::classify(&migration.raw_text)?;
                Ok(Prepared {
                    version: migration.version,
                    name: migration.name,
                    batches: statement::batches(statements),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut report = MigrateReport {
            previous_version: last_applied,
            current_version: last_applied,
            applied: Vec::new(),
        };
        if prepared.is_empty() {
            tracing::info!(version = last_applied, "no pending migrations");
            self.transition(RunState::Done);
            return Ok(report);
        }

        self.ledger.ensure_schema(&self.executor, deadline).await?;

        for migration in prepared {
            let version = migration.version;
            let span = migration_span(version);
            let batches = self
                .apply_one(&migration, &options.mode, deadline)
                .instrument(span)
                .await?;
            report.current_version = version;
            report.applied.push(AppliedMigration {
                version,
                name: migration.name,
                batches,
            });
        }

        self.transition(RunState::Done);
        tracing::info!(
            from = report.previous_version,
            to = report.current_version,
            applied = report.applied.len(),
            "migrations applied"
        );
        Ok(report)
    }

    async fn apply_one(
        &mut self,
        migration: &Prepared,
        mode: &DataChangeMode,
        deadline: Instant,
    ) -> Result<Vec<BatchReport>, TidemarkError> {
        let version = migration.version;
        let db = self.executor.database();

        self.transition(RunState::Applying(version));
        if let Err(e) = self.ledger.begin_version(db, version).await {
            self.transition(RunState::Failed(version));
            return Err(e);
        }

        let batches = match self
            .executor
            .apply_batches(version, &migration.batches, mode, deadline)
            .await
        {
            Ok(batches) => batches,
            Err(e) => {
                self.transition(RunState::Failed(version));
                tracing::error!(version, name = %migration.name, "migration failed: {e}");
                if let Err(mark_err) = self.ledger.mark_dirty(db, version).await {
                    tracing::error!(version, "could not mark version dirty: {mark_err}");
                }
                return Err(e);
            }
        };

        self.transition(RunState::Recording(version));
        if let Err(e) = self.ledger.commit_version(db, version).await {
            // The entry written by begin_version stays dirty
            self.transition(RunState::Failed(version));
            return Err(e);
        }
        tracing::info!(version, name = %migration.name, "applied migration");
        Ok(batches)
    }
}
