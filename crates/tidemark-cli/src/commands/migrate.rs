//! The `migrate` management command.
//!
//! Applies every pending migration file in a directory, in version order,
//! recording each one in the ledger.

use std::path::PathBuf;

use async_trait::async_trait;
use tidemark_core::{Config, TidemarkError};
use tidemark_migrations::{MigrateOptions, MigrateReport, Migrator};

use crate::command::{execution_arguments, with_execution_overrides, ManagementCommand};

use super::{open_database, to_json};

/// Applies pending migrations.
///
/// Supports `--limit` to apply only the next N pending migrations and the
/// shared `--partitioned`, `--priority` and `--node-count` execution flags.
pub struct MigrateCommand;

#[async_trait]
impl ManagementCommand for MigrateCommand {
    fn name(&self) -> &'static str {
        "migrate"
    }

    fn help(&self) -> &'static str {
        "Apply pending migrations"
    }

    fn add_arguments(&self, cmd: clap::Command) -> clap::Command {
        execution_arguments(
            cmd.arg(
                clap::Arg::new("dir")
                    .long("dir")
                    .value_parser(clap::value_parser!(PathBuf))
                    .help("Directory of NNNN_name.sql files (default: <directory>/migrations)"),
            )
            .arg(
                clap::Arg::new("limit")
                    .long("limit")
                    .value_parser(clap::value_parser!(usize))
                    .help("Apply at most this many pending migrations"),
            )
            .arg(
                clap::Arg::new("json")
                    .long("json")
                    .action(clap::ArgAction::SetTrue)
                    .help("Print the run report as JSON"),
            ),
        )
    }

    async fn handle(
        &self,
        matches: &clap::ArgMatches,
        config: &Config,
    ) -> Result<(), TidemarkError> {
        let config = with_execution_overrides(config, matches)?;
        let dir = matches
            .get_one::<PathBuf>("dir")
            .cloned()
            .unwrap_or_else(|| config.migrations_dir());
        let limit = matches.get_one::<usize>("limit").copied();

        tracing::info!(dir = %dir.display(), ?limit, "running migrations");

        let db = open_database(&config)?;
        let migrator = Migrator::new(db.as_ref(), &config);
        let options = MigrateOptions::from_config(&config).with_limit(limit);
        let report = migrator.migrate(&dir, &options).await?;

        if matches.get_flag("json") {
            println!("{}", to_json(&report)?);
        } else {
            println!("{}", render_report(&report));
        }
        Ok(())
    }
}

/// Formats a run report for the terminal.
pub fn render_report(report: &MigrateReport) -> String {
    if report.is_noop() {
        return format!("No migrations to apply (version {})", report.current_version);
    }
    let mut out = String::new();
    for applied in &report.applied {
        out.push_str(&format!(
            "Applied {:04}_{} ({} batch(es))\n",
            applied.version,
            applied.name,
            applied.batches.len()
        ));
    }
    out.push_str(&format!(
        "Migrated from version {} to {}",
        report.previous_version, report.current_version
    ));
    out
}
