//! The `tidemark` binary.
//!
//! ```bash
//! tidemark --database app.db migrate --dir migrations
//! tidemark --database app.db status
//! tidemark --database app.db set-version 4
//! ```

use std::process::ExitCode;

use tidemark_cli::command::{config_from_matches, CommandRegistry};
use tidemark_cli::commands::register_builtin_commands;
use tidemark_core::logging::setup_logging;

#[tokio::main]
async fn main() -> ExitCode {
    let mut registry = CommandRegistry::new();
    register_builtin_commands(&mut registry);
    let matches = registry.build_cli().get_matches();

    let config = match config_from_matches(&matches) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return exit_code(e.exit_code());
        }
    };
    setup_logging(&config);

    match registry.execute(&matches, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(
                category = %e.category(),
                dirty = e.is_dirty_condition(),
                "{e}"
            );
            exit_code(e.exit_code())
        }
    }
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}
