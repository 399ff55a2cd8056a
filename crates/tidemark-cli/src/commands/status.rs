//! The `status` management command.

use async_trait::async_trait;
use serde::Serialize;
use tidemark_core::{Config, TidemarkError};
use tidemark_migrations::Migrator;

use crate::command::ManagementCommand;

use super::{open_database, to_json};

/// Prints the last applied version and whether it is dirty.
pub struct StatusCommand;

#[derive(Debug, Serialize)]
struct Status {
    version: u64,
    dirty: bool,
}

#[async_trait]
impl ManagementCommand for StatusCommand {
    fn name(&self) -> &'static str {
        "status"
    }

    fn help(&self) -> &'static str {
        "Show the current migration version"
    }

    fn add_arguments(&self, cmd: clap::Command) -> clap::Command {
        cmd.arg(
            clap::Arg::new("json")
                .long("json")
                .action(clap::ArgAction::SetTrue)
                .help("Print the status as JSON"),
        )
    }

    async fn handle(
        &self,
        matches: &clap::ArgMatches,
        config: &Config,
    ) -> Result<(), TidemarkError> {
        let db = open_database(config)?;
        let (version, dirty) = Migrator::new(db.as_ref(), config).status().await?;

        if matches.get_flag("json") {
            println!("{}", to_json(&Status { version, dirty })?);
        } else {
            println!("{}", render_status(version, dirty));
        }
        Ok(())
    }
}

/// Formats a status line.
pub fn render_status(version: u64, dirty: bool) -> String {
    match (version, dirty) {
        (0, _) => "No migrations applied".to_string(),
        (v, true) => format!("Version {v} (dirty)"),
        (v, false) => format!("Version {v}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::{file_config, matches};

    #[test]
    fn test_command_metadata() {
        let cmd = StatusCommand;
        assert_eq!(cmd.name(), "status");
        assert_eq!(cmd.help(), "Show the current migration version");
    }

    #[test]
    fn test_render_status() {
        assert_eq!(render_status(0, false), "No migrations applied");
        assert_eq!(render_status(7, false), "Version 7");
        assert_eq!(render_status(7, true), "Version 7 (dirty)");
    }

    #[test]
    fn test_status_json_shape() {
        let json = to_json(&Status {
            version: 3,
            dirty: true,
        })
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["version"], 3);
        assert_eq!(value["dirty"], true);
    }

    #[tokio::test]
    async fn test_handle_on_empty_database() {
        let dir = tempfile::tempdir().unwrap();
        let config = file_config(dir.path());
        let cmd = StatusCommand;
        cmd.handle(&matches(&cmd, &["--json"]), &config)
            .await
            .unwrap();
    }
}
