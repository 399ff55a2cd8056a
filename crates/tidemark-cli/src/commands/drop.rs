//! The `drop` management command.

use async_trait::async_trait;
use tidemark_core::{Config, TidemarkError};
use tidemark_migrations::Migrator;

use crate::command::ManagementCommand;

use super::open_database;

/// Drops every table, the ledger included.
///
/// Requires `--yes`, since the schema and data cannot be recovered.
pub struct DropCommand;

#[async_trait]
impl ManagementCommand for DropCommand {
    fn name(&self) -> &'static str {
        "drop"
    }

    fn help(&self) -> &'static str {
        "Drop every table, including the ledger"
    }

    fn add_arguments(&self, cmd: clap::Command) -> clap::Command {
        cmd.arg(
            clap::Arg::new("yes")
                .long("yes")
                .action(clap::ArgAction::SetTrue)
                .help("Confirm that all tables should be dropped"),
        )
    }

    async fn handle(
        &self,
        matches: &clap::ArgMatches,
        config: &Config,
    ) -> Result<(), TidemarkError> {
        if !matches.get_flag("yes") {
            return Err(TidemarkError::Configuration(
                "drop removes every table; pass --yes to confirm".to_string(),
            ));
        }
        let db = open_database(config)?;
        let dropped = Migrator::new(db.as_ref(), config).drop_all().await?;
        println!("Dropped {} table(s)", dropped.len());
        Ok(())
    }
}
