//! Built-in management commands.
//!
//! Each command implements the
//! [`ManagementCommand`](crate::command::ManagementCommand) trait, opens the
//! configured database and calls one [`Migrator`](tidemark_migrations::Migrator)
//! operation.

pub mod apply;
pub mod create;
pub mod drop;
pub mod history;
pub mod load;
pub mod migrate;
pub mod reset;
pub mod set_version;
pub mod status;
pub mod truncate;

pub use apply::ApplyCommand;
pub use create::CreateCommand;
pub use drop::DropCommand;
pub use history::HistoryCommand;
pub use load::LoadCommand;
pub use migrate::MigrateCommand;
pub use reset::ResetCommand;
pub use set_version::SetVersionCommand;
pub use status::StatusCommand;
pub use truncate::TruncateCommand;

use serde::Serialize;
use tidemark_core::{Config, TidemarkError};
use tidemark_db_backends::Database;

use crate::command::CommandRegistry;

/// Registers all built-in management commands into the given registry.
pub fn register_builtin_commands(registry: &mut CommandRegistry) {
    registry.register(Box::new(MigrateCommand));
    registry.register(Box::new(StatusCommand));
    registry.register(Box::new(HistoryCommand));
    registry.register(Box::new(SetVersionCommand));
    registry.register(Box::new(LoadCommand));
    registry.register(Box::new(ApplyCommand));
    registry.register(Box::new(TruncateCommand));
    registry.register(Box::new(CreateCommand));
    registry.register(Box::new(DropCommand));
    registry.register(Box::new(ResetCommand));
}

/// Opens the database named in `config`.
pub(crate) fn open_database(config: &Config) -> Result<Box<dyn Database>, TidemarkError> {
    if let Some(path) = &config.credentials_file {
        tracing::debug!(credentials = %path.display(), "using credentials file");
    }
    let db = tidemark_db_backends::connect(&config.database)?;
    tracing::debug!(vendor = db.vendor(), database = %config.database.name, "connected");
    Ok(db)
}

/// Serializes `value` as pretty JSON.
pub(crate) fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, TidemarkError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| TidemarkError::Database(format!("Failed to serialize output: {e}")))
}
