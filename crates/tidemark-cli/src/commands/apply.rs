//! The `apply` management command.

use std::path::PathBuf;

use async_trait::async_trait;
use tidemark_core::{Config, TidemarkError};
use tidemark_migrations::{DataChangeMode, Migrator};

use crate::command::{execution_arguments, with_execution_overrides, ManagementCommand};

use super::load::render_batches;
use super::open_database;

/// Applies a single SQL file without recording it in the ledger.
///
/// Useful for one-off backfills; pass `--partitioned` for large data changes.
pub struct ApplyCommand;

#[async_trait]
impl ManagementCommand for ApplyCommand {
    fn name(&self) -> &'static str {
        "apply"
    }

    fn help(&self) -> &'static str {
        "Apply a single SQL file outside the ledger"
    }

    fn add_arguments(&self, cmd: clap::Command) -> clap::Command {
        execution_arguments(
            cmd.arg(
                clap::Arg::new("file")
                    .value_parser(clap::value_parser!(PathBuf))
                    .required(true)
                    .help("SQL file to apply"),
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
            .ok_or_else(|| TidemarkError::Configuration("A file is required".to_string()))?;
        let mode = DataChangeMode::from_settings(&config.execution);

        let db = open_database(&config)?;
        let reports = Migrator::new(db.as_ref(), &config)
            .apply(file, &mode)
            .await?;
        println!("{}", render_batches(&file.display().to_string(), &reports));
        Ok(())
    }
}
