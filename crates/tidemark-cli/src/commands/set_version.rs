//! The `set-version` management command.
//!
//! Operator recovery after a failed migration: once the database has been
//! fixed by hand, force the ledger entry for a version and clear (or set) its
//! dirty flag. Nothing is executed against the schema.

use async_trait::async_trait;
use tidemark_core::{Config, TidemarkError};
use tidemark_migrations::Migrator;

use crate::command::ManagementCommand;

use super::open_database;

/// Writes a ledger entry without running any migration.
pub struct SetVersionCommand;

#[async_trait]
impl ManagementCommand for SetVersionCommand {
    fn name(&self) -> &'static str {
        "set-version"
    }

    fn help(&self) -> &'static str {
        "Force the ledger entry for a version"
    }

    fn add_arguments(&self, cmd: clap::Command) -> clap::Command {
        cmd.arg(
            clap::Arg::new("version")
                .value_parser(clap::value_parser!(u64).range(1..))
                .required(true)
                .help("Version to record"),
        )
        .arg(
            clap::Arg::new("dirty")
                .long("dirty")
                .action(clap::ArgAction::SetTrue)
                .help("Record the version as dirty instead of clean"),
        )
    }

    async fn handle(
        &self,
        matches: &clap::ArgMatches,
        config: &Config,
    ) -> Result<(), TidemarkError> {
        let version = *matches
            .get_one::<u64>("version")
            .ok_or_else(|| TidemarkError::Configuration("A version is required".to_string()))?;
        let dirty = matches.get_flag("dirty");

        let db = open_database(config)?;
        Migrator::new(db.as_ref(), config)
            .set_version(version, dirty)
            .await?;
        println!("Recorded version {version}{}", if dirty { " (dirty)" } else { "" });
        Ok(())
    }
}
