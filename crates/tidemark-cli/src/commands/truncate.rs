//! The `truncate` management command.

use async_trait::async_trait;
use tidemark_core::{Config, TidemarkError};
use tidemark_migrations::Migrator;

use crate::command::{execution_arguments, with_execution_overrides, ManagementCommand};

use super::open_database;

/// Deletes every row from every table except the ledger.
///
/// Requires `--yes`, since the data cannot be recovered.
pub struct TruncateCommand;

#[async_trait]
impl ManagementCommand for TruncateCommand {
    fn name(&self) -> &'static str {
        "truncate"
    }

    fn help(&self) -> &'static str {
        "Delete all rows from every table except the ledger"
    }

    fn add_arguments(&self, cmd: clap::Command) -> clap::Command {
        execution_arguments(
            cmd.arg(
                clap::Arg::new("yes")
                    .long("yes")
                    .action(clap::ArgAction::SetTrue)
                    .help("Confirm that all data should be deleted"),
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
                "truncate deletes all data; pass --yes to confirm".to_string(),
            ));
        }
        let config = with_execution_overrides(config, matches)?;

        let db = open_database(&config)?;
        let truncated = Migrator::new(db.as_ref(), &config).truncate().await?;
        for table in &truncated {
            println!("{}: {} row(s) deleted", table.table, table.rows_deleted);
        }
        println!("Truncated {} table(s)", truncated.len());
        Ok(())
    }
}
