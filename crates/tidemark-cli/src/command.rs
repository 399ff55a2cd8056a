//! Management command framework for tidemark.
//!
//! This module provides the [`ManagementCommand`] trait for defining CLI
//! commands and [`CommandRegistry`] for registering and dispatching them. The
//! registry also owns the global options (`--config`, `--database`,
//! `--timeout`, ...) and turns them into the single [`Config`] value every
//! command receives.
//!
//! ## Defining a Custom Command
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use tidemark_cli::command::ManagementCommand;
//! use tidemark_core::{Config, TidemarkError};
//!
//! struct PingCommand;
//!
//! #[async_trait]
//! impl ManagementCommand for PingCommand {
//!     fn name(&self) -> &str { "ping" }
//!     fn help(&self) -> &str { "Check the database connection" }
//!
//!     async fn handle(
//!         &self,
//!         _matches: &clap::ArgMatches,
//!         config: &Config,
//!     ) -> Result<(), TidemarkError> {
//!         let db = tidemark_db_backends::connect(&config.database)?;
//!         println!("connected to {}", db.vendor());
//!         Ok(())
//!     }
//! }
//! ```

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tidemark_core::{Config, LogFormat, Priority, TidemarkError};

/// A management command that can be registered and invoked through the CLI.
///
/// Implementations define a name, help text, optional arguments, and an async
/// handler. All commands must be `Send + Sync`.
#[async_trait]
pub trait ManagementCommand: Send + Sync {
    /// Returns the name of this command (used to invoke it from the CLI).
    fn name(&self) -> &str;

    /// Returns a short help description for this command.
    fn help(&self) -> &str;

    /// Adds command-specific arguments to the clap command.
    ///
    /// The default implementation returns the command unchanged.
    fn add_arguments(&self, cmd: clap::Command) -> clap::Command {
        cmd
    }

    /// Executes the command with the given argument matches and configuration.
    async fn handle(&self, matches: &clap::ArgMatches, config: &Config)
        -> Result<(), TidemarkError>;
}

/// A registry of management commands.
///
/// Commands are registered by name and can be looked up, listed, or executed.
pub struct CommandRegistry {
    commands: HashMap<String, Box<dyn ManagementCommand>>,
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRegistry {
    /// Creates a new empty command registry.
    pub fn new() -> Self {
        Self {
            commands: HashMap::new(),
        }
    }

    /// Registers a management command.
    ///
    /// If a command with the same name already exists, it is replaced.
    pub fn register(&mut self, command: Box<dyn ManagementCommand>) {
        let name = command.name().to_string();
        self.commands.insert(name, command);
    }

    /// Returns a reference to the command with the given name, if registered.
    pub fn get(&self, name: &str) -> Option<&dyn ManagementCommand> {
        self.commands.get(name).map(AsRef::as_ref)
    }

    /// Returns a sorted list of all registered command names.
    pub fn list_commands(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.commands.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Returns the number of registered commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns `true` if no commands are registered.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Builds the top-level clap `Command` with the global options and every
    /// registered subcommand.
    pub fn build_cli(&self) -> clap::Command {
        let mut app = global_arguments(
            clap::Command::new("tidemark")
                .about("Versioned schema and data migrations")
                .subcommand_required(true),
        );

        let mut entries: Vec<_> = self.commands.iter().collect();
        entries.sort_by_key(|(name, _)| (*name).clone());

        for (name, cmd) in entries {
            // clap wants 'static names; commands are registered once at startup.
            let static_name: &'static str = Box::leak(name.clone().into_boxed_str());
            let subcmd = clap::Command::new(static_name).about(cmd.help().to_string());
            app = app.subcommand(cmd.add_arguments(subcmd));
        }

        app
    }

    /// Executes the command identified by the given argument matches.
    pub async fn execute(
        &self,
        matches: &clap::ArgMatches,
        config: &Config,
    ) -> Result<(), TidemarkError> {
        let (name, sub_matches) = matches.subcommand().ok_or_else(|| {
            TidemarkError::Configuration("No subcommand specified".to_string())
        })?;

        let cmd = self
            .get(name)
            .ok_or_else(|| TidemarkError::Configuration(format!("Unknown command: {name}")))?;

        cmd.handle(sub_matches, config).await
    }
}

fn global_arguments(cmd: clap::Command) -> clap::Command {
    let global = |arg: clap::Arg| arg.global(true);
    cmd.arg(global(
        clap::Arg::new("config")
            .long("config")
            .value_parser(clap::value_parser!(PathBuf))
            .help("TOML configuration file"),
    ))
    .arg(global(
        clap::Arg::new("directory")
            .long("directory")
            .value_parser(clap::value_parser!(PathBuf))
            .help("Project directory holding the schema file and migrations/ (default: .)"),
    ))
    .arg(global(
        clap::Arg::new("schema-file")
            .long("schema-file")
            .help("Name of the baseline schema file (default: schema.sql)"),
    ))
    .arg(global(
        clap::Arg::new("engine")
            .long("engine")
            .help("Database engine (default: sqlite)"),
    ))
    .arg(global(
        clap::Arg::new("database")
            .long("database")
            .short('d')
            .help("Database name or file"),
    ))
    .arg(global(
        clap::Arg::new("credentials-file")
            .long("credentials-file")
            .value_parser(clap::value_parser!(PathBuf))
            .help("Credentials file passed to the backend"),
    ))
    .arg(global(
        clap::Arg::new("migration-table")
            .long("migration-table")
            .help("Name of the ledger table (default: SchemaMigrations)"),
    ))
    .arg(global(
        clap::Arg::new("timeout")
            .long("timeout")
            .value_parser(clap::value_parser!(u64))
            .help("Operation deadline in seconds (default: 3600)"),
    ))
    .arg(global(
        clap::Arg::new("log-level")
            .long("log-level")
            .help("Log filter, e.g. info or tidemark_migrations=debug"),
    ))
    .arg(global(
        clap::Arg::new("log-format")
            .long("log-format")
            .value_parser(["pretty", "json"])
            .help("Log output format"),
    ))
}

/// Builds the run configuration from the global options.
///
/// The TOML file named by `--config` is read first, then individual flags
/// override its values. The result is validated.
pub fn config_from_matches(matches: &clap::ArgMatches) -> Result<Config, TidemarkError> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => Config::from_toml_file(path)?,
        None => Config::default(),
    };

    if let Some(directory) = matches.get_one::<PathBuf>("directory") {
        config.directory.clone_from(directory);
    }
    if let Some(schema_file) = matches.get_one::<String>("schema-file") {
        config.schema_file.clone_from(schema_file);
    }
    if let Some(engine) = matches.get_one::<String>("engine") {
        config.database.engine.clone_from(engine);
    }
    if let Some(name) = matches.get_one::<String>("database") {
        config.database.name.clone_from(name);
    }
    if let Some(path) = matches.get_one::<PathBuf>("credentials-file") {
        config.credentials_file = Some(path.clone());
    }
    if let Some(table) = matches.get_one::<String>("migration-table") {
        config.migration_table.clone_from(table);
    }
    if let Some(timeout) = matches.get_one::<u64>("timeout") {
        config.timeout_secs = *timeout;
    }
    if let Some(level) = matches.get_one::<String>("log-level") {
        config.log_level.clone_from(level);
    }
    if let Some(format) = matches.get_one::<String>("log-format") {
        config.log_format = if format == "json" {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        };
    }

    config.validate()?;
    Ok(config)
}

/// Adds the data-change execution flags shared by `apply`, `load` and `migrate`.
pub fn execution_arguments(cmd: clap::Command) -> clap::Command {
    cmd.arg(
        clap::Arg::new("partitioned")
            .long("partitioned")
            .action(clap::ArgAction::SetTrue)
            .help("Run data changes with partitioned execution instead of transactions"),
    )
    .arg(
        clap::Arg::new("priority")
            .long("priority")
            .value_parser(["low", "medium", "high"])
            .help("Priority hint for partitioned execution"),
    )
    .arg(
        clap::Arg::new("node-count")
            .long("node-count")
            .value_parser(clap::value_parser!(u32).range(1..))
            .help("Worker limit for partitioned execution"),
    )
}

/// Returns `config` with the execution flags from `matches` applied.
pub fn with_execution_overrides(
    config: &Config,
    matches: &clap::ArgMatches,
) -> Result<Config, TidemarkError> {
    let mut config = config.clone();
    if matches.get_flag("partitioned") {
        config.execution.partitioned = true;
    }
    if let Some(priority) = matches.get_one::<String>("priority") {
        config.execution.priority = priority.parse::<Priority>()?;
    }
    if let Some(nodes) = matches.get_one::<u32>("node-count") {
        config.execution.node_count = Some(*nodes);
    }
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestCommand {
        cmd_name: String,
    }

    impl TestCommand {
        fn new(name: &str) -> Self {
            Self {
                cmd_name: name.to_string(),
            }
        }
    }

    #[async_trait]
    impl ManagementCommand for TestCommand {
        fn name(&self) -> &str {
            &self.cmd_name
        }

        fn help(&self) -> &'static str {
            "A test command"
        }

        fn add_arguments(&self, cmd: clap::Command) -> clap::Command {
            execution_arguments(cmd)
        }

        async fn handle(
            &self,
            _matches: &clap::ArgMatches,
            _config: &Config,
        ) -> Result<(), TidemarkError> {
            Ok(())
        }
    }

    struct FailingCommand;

    #[async_trait]
    impl ManagementCommand for FailingCommand {
        fn name(&self) -> &'static str {
            "fail"
        }

        fn help(&self) -> &'static str {
            "A command that always fails"
        }

        async fn handle(
            &self,
            _matches: &clap::ArgMatches,
            _config: &Config,
        ) -> Result<(), TidemarkError> {
            Err(TidemarkError::Blocked { version: 9 })
        }
    }

    #[test]
    fn test_registry_new_is_empty() {
        let registry = CommandRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_register_and_get() {
        let mut registry = CommandRegistry::new();
        registry.register(Box::new(TestCommand::new("test")));
        assert_eq!(registry.len(), 1);
        let cmd = registry.get("test").unwrap();
        assert_eq!(cmd.name(), "test");
        assert_eq!(cmd.help(), "A test command");
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn test_list_commands_sorted() {
        let mut registry = CommandRegistry::new();
        registry.register(Box::new(TestCommand::new("status")));
        registry.register(Box::new(TestCommand::new("apply")));
        registry.register(Box::new(TestCommand::new("migrate")));
        assert_eq!(registry.list_commands(), vec!["apply", "migrate", "status"]);
    }

    #[test]
    fn test_global_options_build_config() {
        let mut registry = CommandRegistry::new();
        registry.register(Box::new(TestCommand::new("test")));
        let matches = registry
            .build_cli()
            .try_get_matches_from([
                "tidemark",
                "test",
                "--database",
                "app.db",
                "--migration-table",
                "Versions",
                "--timeout",
                "60",
                "--log-format",
                "json",
            ])
            .unwrap();
        let config = config_from_matches(&matches).unwrap();
        assert_eq!(config.database.name, "app.db");
        assert_eq!(config.migration_table, "Versions");
        assert_eq!(config.timeout_secs, 60);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_directory_layout_flags() {
        let mut registry = CommandRegistry::new();
        registry.register(Box::new(TestCommand::new("test")));
        let matches = registry
            .build_cli()
            .try_get_matches_from([
                "tidemark",
                "test",
                "--directory",
                "db",
                "--schema-file",
                "baseline.sql",
            ])
            .unwrap();
        let config = config_from_matches(&matches).unwrap();
        assert_eq!(config.schema_path(), PathBuf::from("db").join("baseline.sql"));
        assert_eq!(config.migrations_dir(), PathBuf::from("db").join("migrations"));
    }

    #[test]
    fn test_config_file_then_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tidemark.toml");
        std::fs::write(
            &path,
            "timeout_secs = 30\nmigration_table = \"FromFile\"\n[database]\nname = \"file.db\"\n",
        )
        .unwrap();

        let mut registry = CommandRegistry::new();
        registry.register(Box::new(TestCommand::new("test")));
        let matches = registry
            .build_cli()
            .try_get_matches_from([
                "tidemark",
                "--config",
                path.to_str().unwrap(),
                "test",
                "--timeout",
                "90",
            ])
            .unwrap();
        let config = config_from_matches(&matches).unwrap();
        assert_eq!(config.timeout_secs, 90);
        assert_eq!(config.migration_table, "FromFile");
        assert_eq!(config.database.name, "file.db");
    }

    #[test]
    fn test_invalid_table_rejected() {
        let mut registry = CommandRegistry::new();
        registry.register(Box::new(TestCommand::new("test")));
        let matches = registry
            .build_cli()
            .try_get_matches_from(["tidemark", "test", "--migration-table", "bad name"])
            .unwrap();
        assert!(matches!(
            config_from_matches(&matches),
            Err(TidemarkError::Configuration(_))
        ));
    }

    #[test]
    fn test_execution_overrides() {
        let mut registry = CommandRegistry::new();
        registry.register(Box::new(TestCommand::new("test")));
        let matches = registry
            .build_cli()
            .try_get_matches_from([
                "tidemark",
                "test",
                "--partitioned",
                "--priority",
                "low",
                "--node-count",
                "8",
            ])
            .unwrap();
        let (_, sub) = matches.subcommand().unwrap();
        let config = with_execution_overrides(&Config::default(), sub).unwrap();
        assert!(config.execution.partitioned);
        assert_eq!(config.execution.priority, Priority::Low);
        assert_eq!(config.execution.node_count, Some(8));
    }

    #[test]
    fn test_node_count_zero_rejected_by_parser() {
        let mut registry = CommandRegistry::new();
        registry.register(Box::new(TestCommand::new("test")));
        let result = registry
            .build_cli()
            .try_get_matches_from(["tidemark", "test", "--node-count", "0"]);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_execute_dispatches() {
        let mut registry = CommandRegistry::new();
        registry.register(Box::new(TestCommand::new("test")));
        registry.register(Box::new(FailingCommand));
        let config = Config::default();

        let matches = registry
            .build_cli()
            .try_get_matches_from(["tidemark", "test"])
            .unwrap();
        assert!(registry.execute(&matches, &config).await.is_ok());

        let matches = registry
            .build_cli()
            .try_get_matches_from(["tidemark", "fail"])
            .unwrap();
        let err = registry.execute(&matches, &config).await.unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }
}
