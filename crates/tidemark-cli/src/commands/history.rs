//! The `history` management command.

use async_trait::async_trait;
use tidemark_core::{Config, TidemarkError};
use tidemark_migrations::{LedgerEntry, Migrator};

use crate::command::ManagementCommand;

use super::{open_database, to_json};

/// Lists every ledger entry in ascending version order.
pub struct HistoryCommand;

#[async_trait]
impl ManagementCommand for HistoryCommand {
    fn name(&self) -> &'static str {
        "history"
    }

    fn help(&self) -> &'static str {
        "List recorded migration versions"
    }

    fn add_arguments(&self, cmd: clap::Command) -> clap::Command {
        cmd.arg(
            clap::Arg::new("json")
                .long("json")
                .action(clap::ArgAction::SetTrue)
                .help("Print the entries as JSON"),
        )
    }

    async fn handle(
        &self,
        matches: &clap::ArgMatches,
        config: &Config,
    ) -> Result<(), TidemarkError> {
        let db = open_database(config)?;
        let entries = Migrator::new(db.as_ref(), config).history().await?;

        if matches.get_flag("json") {
            println!("{}", to_json(&entries)?);
        } else {
            println!("{}", render_history(&entries));
        }
        Ok(())
    }
}

/// Formats ledger entries as one line each.
pub fn render_history(entries: &[LedgerEntry]) -> String {
    if entries.is_empty() {
        return "No migrations recorded".to_string();
    }
    entries
        .iter()
        .map(|entry| {
            let marker = if entry.dirty { "dirty" } else { "ok" };
            format!(
                "{:>6}  {:<5}  {}",
                entry.version,
                marker,
                entry.applied_at.format("%Y-%m-%d %H:%M:%S UTC")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
