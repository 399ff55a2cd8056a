//! The `reset` management command.
//!
//! Rebuilds a database from scratch: every table is dropped, the baseline
//! schema is applied again, and with `--migrate` the pending migrations are
//! applied on top.

use std::path::PathBuf;

use async_trait::async_trait;
use tidemark_core::{Config, TidemarkError};
use tidemark_migrations::{MigrateOptions, Migrator};

use crate::command::{execution_arguments, with_execution_overrides, ManagementCommand};

use super::load::render_batches;
use super::migrate::render_report;
use super::open_database;

/// Drops every table and reloads the baseline schema.
pub struct ResetCommand;

#[async_trait]
impl ManagementCommand for ResetCommand {
    fn name(&self) -> &'static str {
        "reset"
    }

    fn help(&self) -> &'static str {
        "Drop every table and reload the baseline schema"
    }

    fn add_arguments(&self, cmd: clap::Command) -> clap::Command {
        execution_arguments(
            cmd.arg(
                clap::Arg::new("file")
                    .value_parser(clap::value_parser!(PathBuf))
                    .help("Baseline schema file (default: <directory>/<schema-file>)"),
            )
            .arg(
                clap::Arg::new("migrate")
                    .long("migrate")
                    .action(clap::ArgAction::SetTrue)
                    .help("Apply <directory>/migrations after reloading the baseline"),
            )
            .arg(
                clap::Arg::new("yes")
                    .long("yes")
                    .action(clap::ArgAction::SetTrue)
                    .help("Confirm that all tables should be dropped"),
            ),
        )
    }

    async fn handle(
        &self,
        matches: &clap::ArgMatches,
        config: &Config,
    ) -> Result<(), TidemarkError> {
        if !matches.get_flag("yes") {
            return Err(TidemarkError::Configuration(
                "reset drops every table; pass --yes to confirm".to_string(),
            ));
        }
        let config = with_execution_overrides(config, matches)?;
        let file = matches
            .get_one::<PathBuf>("file")
            .cloned()
            .unwrap_or_else(|| config.schema_path());

        let db = open_database(&config)?;
        let migrator = Migrator::new(db.as_ref(), &config);
        let report = migrator.reset(&file).await?;
        println!("Dropped {} table(s)", report.dropped.len());
        println!("{}", render_batches(&file.display().to_string(), &report.baseline));

        if matches.get_flag("migrate") {
            let options = MigrateOptions::from_config(&config);
            let migrated = migrator.migrate(&config.migrations_dir(), &options).await?;
            println!("{}", render_report(&migrated));
        }
        Ok(())
    }
}
