//! Logging integration for tidemark.
//!
//! Provides helpers for configuring [`tracing`]-based logging from a
//! [`Config`](crate::config::Config) and for creating per-migration spans.

use crate::config::{Config, LogFormat};

/// Sets up the global tracing subscriber based on the given configuration.
///
/// The filter is read from `config.log_level` (e.g. "debug", "info",
/// "tidemark_migrations=trace"). `LogFormat::Pretty` prints human-readable
/// output for terminals; `LogFormat::Json` prints one JSON object per event
/// for log collectors.
///
/// Installing a subscriber twice is not an error; the second call is ignored.
pub fn setup_logging(config: &Config) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    match config.log_format {
        LogFormat::Pretty => {
            fmt::Subscriber::builder()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(false)
                .pretty()
                .try_init()
                .ok();
        }
        LogFormat::Json => {
            fmt::Subscriber::builder()
                .with_env_filter(filter)
                .with_target(true)
                .json()
                .try_init()
                .ok();
        }
    }
}

/// Creates a tracing span for applying one migration version.
///
/// Every event emitted while the span is entered carries the version, so
/// interleaved logs from batches and polls can be attributed.
///
/// # Examples
///
/// ```
/// use tidemark_core::logging::migration_span;
///
/// let span = migration_span(42);
/// let _guard = span.enter();
/// tracing::info!("applying");
/// ```
pub fn migration_span(version: u64) -> tracing::Span {
    tracing::info_span!("migration", version)
}
