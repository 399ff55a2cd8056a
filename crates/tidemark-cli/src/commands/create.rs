//! The `create` management command.

use std::path::PathBuf;

use async_trait::async_trait;
use tidemark_core::{Config, TidemarkError};
use tidemark_migrations::Migrator;

use crate::command::{execution_arguments, with_execution_overrides, ManagementCommand};

use super::load::render_batches;
use super::open_database;

/// Applies the baseline schema to an empty database.
///
/// Fails when the database already has tables; use `reset` to rebuild one.
pub struct CreateCommand;

#[async_trait]
impl ManagementCommand for CreateCommand {
    fn name(&self) -> &'static str {
        "create"
    }

    fn help(&self) -> &'static str {
        "Create the schema in an empty database from the baseline file"
    }

    fn add_arguments(&self, cmd: clap::Command) -> clap::Command {
        execution_arguments(
            cmd.arg(
                clap::Arg::new("file")
                    .value_parser(clap::value_parser!(PathBuf))
                    .help("Baseline schema file (default: <directory>/<schema-file>)"),
            ),
        )
    }

    async fn handle(
        &self,
        matches: &clap::ArgMatches,
        config: &Config,
    ) -> Result<(), TidemarkError> {
        let config = with_execution_overrides(config, matches)?;
        let file = matches
            .get_one::<PathBuf>("file")
            .cloned()
            .unwrap_or_else(|| config.schema_path());

        let db = open_database(&config)?;
        let reports = Migrator::new(db.as_ref(), &config).create(&file).await?;
        println!("{}", render_batches(&file.display().to_string(), &reports));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::{file_config, matches};

    #[test]
    fn test_command_metadata() {
        let cmd = CreateCommand;
        assert_eq!(cmd.name(), "create");
        assert_eq!(
            cmd.help(),
            "Create the schema in an empty database from the baseline file"
        );
    }

    #[tokio::test]
    async fn test_handle_creates_once() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("schema.sql"),
            "CREATE TABLE venues (id INTEGER PRIMARY KEY);",
        )
        .unwrap();
        let mut config = file_config(dir.path());
        config.directory = dir.path().to_path_buf();

        let cmd = CreateCommand;
        cmd.handle(&matches(&cmd, &[]), &config).await.unwrap();
        let err = cmd.handle(&matches(&cmd, &[]), &config).await.unwrap_err();
        assert!(matches!(err, TidemarkError::Configuration(_)));

        let db = tidemark_db_backends::connect(&config.database).unwrap();
        assert!(db.table_exists("venues").await.unwrap());
    }
}
