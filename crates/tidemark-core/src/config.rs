//! Run configuration for tidemark.
//!
//! A [`Config`] is built once by the front end (from a TOML file, command-line
//! flags, or code) and then passed by reference into every operation. Nothing
//! in tidemark reads configuration from global state.
//!
//! ## TOML layout
//!
//! Every key is optional; missing keys keep their defaults.
//!
//! ```toml
//! directory = "db"
//! schema_file = "schema.sql"
//! migration_table = "SchemaMigrations"
//! timeout_secs = 3600
//! poll_interval_ms = 1000
//! log_level = "info"
//! log_format = "pretty"
//!
//! [database]
//! engine = "sqlite"
//! name = "app.db"
//!
//! [execution]
//! partitioned = false
//! priority = "medium"
//! node_count = 4
//!
//! [retry]
//! max_attempts = 10
//! initial_backoff_ms = 20
//! max_backoff_ms = 32000
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::TidemarkError;

/// The default name of the ledger table.
pub const DEFAULT_MIGRATION_TABLE: &str = "SchemaMigrations";

/// The default name of the baseline schema file inside the project directory.
pub const DEFAULT_SCHEMA_FILE: &str = "schema.sql";

/// The name of the migrations directory inside the project directory.
pub const MIGRATIONS_DIR: &str = "migrations";

/// Target database identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// The backend engine (currently `sqlite`).
    pub engine: String,
    /// The database name, or file path for `SQLite`.
    pub name: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            engine: "sqlite".to_string(),
            name: "tidemark.db".to_string(),
        }
    }
}

/// Request priority hint for partitioned data changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Yield to foreground traffic.
    Low,
    /// The database default.
    #[default]
    Medium,
    /// Compete with foreground traffic.
    High,
}

impl Priority {
    /// Returns the lowercase name of this priority.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = TidemarkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(TidemarkError::Configuration(format!(
                "Unknown priority '{other}' (expected low, medium or high)"
            ))),
        }
    }
}

/// How data-change statements are executed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionSettings {
    /// Run data changes with partitioned execution instead of transactions.
    pub partitioned: bool,
    /// Priority hint for partitioned execution.
    pub priority: Priority,
    /// Upper bound on workers used by partitioned execution.
    pub node_count: Option<u32>,
}

/// Retry policy for aborted read-write transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Backoff before the first retry, in milliseconds.
    pub initial_backoff_ms: u64,
    /// Upper bound for the doubling backoff, in milliseconds.
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_backoff_ms: 20,
            max_backoff_ms: 32_000,
        }
    }
}

impl RetryPolicy {
    /// Returns the backoff to wait before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1_u64 << retry.saturating_sub(1).min(20);
        let millis = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(millis)
    }
}

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

/// The complete, immutable configuration of a tidemark run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Target database identity.
    pub database: DatabaseSettings,
    /// Credentials file handed to the backend untouched.
    pub credentials_file: Option<PathBuf>,
    /// Project directory holding the baseline schema and `migrations/`.
    pub directory: PathBuf,
    /// File name of the baseline schema inside `directory`.
    pub schema_file: String,
    /// Name of the ledger table inside the target database.
    pub migration_table: String,
    /// Deadline for a whole operation, in seconds.
    pub timeout_secs: u64,
    /// How often a pending schema operation is polled, in milliseconds.
    pub poll_interval_ms: u64,
    /// Data-change execution mode and hints.
    pub execution: ExecutionSettings,
    /// Retry policy for aborted transactions.
    pub retry: RetryPolicy,
    /// The log filter (e.g. "info", "tidemark_migrations=debug").
    pub log_level: String,
    /// Log output format.
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseSettings::default(),
            credentials_file: None,
            directory: PathBuf::from("."),
            schema_file: DEFAULT_SCHEMA_FILE.to_string(),
            migration_table: DEFAULT_MIGRATION_TABLE.to_string(),
            timeout_secs: 3600,
            poll_interval_ms: 1000,
            execution: ExecutionSettings::default(),
            retry: RetryPolicy::default(),
            log_level: "info".to_string(),
            log_format: LogFormat::default(),
        }
    }
}

impl Config {
    /// Returns the operation deadline as a `Duration`.
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Returns the schema operation poll interval as a `Duration`.
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Returns the path of the baseline schema file.
    pub fn schema_path(&self) -> PathBuf {
        self.directory.join(&self.schema_file)
    }

    /// Returns the directory holding versioned migration files.
    pub fn migrations_dir(&self) -> PathBuf {
        self.directory.join(MIGRATIONS_DIR)
    }

    /// Checks the configuration for values no run can work with.
    pub fn validate(&self) -> Result<(), TidemarkError> {
        if self.migration_table.trim().is_empty() {
            return Err(TidemarkError::Configuration(
                "migration_table must not be empty".to_string(),
            ));
        }
        if !self
            .migration_table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(TidemarkError::Configuration(format!(
                "migration_table '{}' may only contain letters, digits and underscores",
                self.migration_table
            )));
        }
        if self.timeout_secs == 0 {
            return Err(TidemarkError::Configuration(
                "timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(TidemarkError::Configuration(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(TidemarkError::Configuration(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.execution.node_count == Some(0) {
            return Err(TidemarkError::Configuration(
                "execution.node_count must be at least 1".to_string(),
            ));
        }
        if self.schema_file.trim().is_empty() {
            return Err(TidemarkError::Configuration(
                "schema_file must not be empty".to_string(),
            ));
        }
        if self.database.name.trim().is_empty() {
            return Err(TidemarkError::Configuration(
                "database.name must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Loads a configuration from a TOML string.
    ///
    /// Keys not present in the TOML keep their default values. The result is
    /// validated before it is returned.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, TidemarkError> {
        let config: Self = toml::from_str(toml_str)
            .map_err(|e| TidemarkError::Configuration(format!("Failed to parse TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, TidemarkError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            TidemarkError::Configuration(format!(
                "Failed to read TOML file '{}': {e}",
                path.as_ref().display()
            ))
        })?;
        Self::from_toml_str(&content)
    }
}
