//! The `load` management command.
//!
//! Applies a baseline schema file to a fresh database. The ledger is not
//! touched; versioned migrations are applied on top with `migrate`.

use std::path::PathBuf;

use async_trait::async_trait;
use tidemark_core::{Config, TidemarkError};
use tidemark_migrations::{BatchReport, Migrator};

use crate::command::{execution_arguments, with_execution_overrides, ManagementCommand};

use super::open_database;

/// Applies a baseline schema file.
pub struct LoadCommand;

#[async_trait]
impl ManagementCommand for LoadCommand {
    fn name(&self) -> &'static str {
        "load"
    }

    fn help(&self) -> &'static str {
        "Apply a baseline schema file"
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
        let reports = Migrator::new(db.as_ref(), &config).load(&file).await?;
        println!("{}", render_batches(&file.display().to_string(), &reports));
        Ok(())
    }
}

/// Summarizes the batches applied from one file.
pub fn render_batches(file: &str, reports: &[BatchReport]) -> String {
    let statements: usize = reports.iter().map(|r| r.statements).sum();
    let rows: u64 = reports.iter().map(|r| r.rows_affected).sum();
    format!(
        "Applied {file}: {statements} statement(s) in {} batch(es), {rows} row(s) affected",
        reports.len()
    )
}
