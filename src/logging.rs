//! Logging configuration for ragchat

use std::path::Path;

use tracing_subscriber::fmt;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Registry;

use crate::config::LoggingConfig;
use crate::Result;

const LOG_FILE_PREFIX: &str = "ragchat.log";

/// Initialize logging with configuration
///
/// `RUST_LOG` wins over the configured level when it is set.
pub fn init_logging_with_config(config: &LoggingConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(&config.level)));
    init_with_filter(env_filter, &config.directory)?;

    tracing::info!(
        "Logging initialized with level: {} - console and file output enabled",
        config.level
    );
    tracing::info!(
        "Log files will be saved to: {}/{}.YYYY-MM-DD",
        config.directory,
        LOG_FILE_PREFIX
    );
    Ok(())
}

/// Initialize logging with custom log level
pub fn init_logging_with_level(level: &str) -> Result<()> {
    init_logging_with_config(&LoggingConfig {
        level: level.to_string(),
        ..LoggingConfig::default()
    })
}

fn init_with_filter(env_filter: EnvFilter, directory: &str) -> Result<()> {
    let logs_dir = Path::new(directory);
    if !logs_dir.exists() {
        std::fs::create_dir_all(logs_dir)?;
    }

    let file_appender = tracing_appender::rolling::daily(logs_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr);

    let file_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(non_blocking)
        .with_ansi(false);

    Registry::default()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| crate::RagChatError::ConfigError(format!("logging already initialized: {e}")))?;

    // The writer thread must outlive every span in the process.
    std::mem::forget(guard);
    Ok(())
}

/// Initialize simple console logging for tools and tests
pub fn init_simple_logging() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| crate::RagChatError::ConfigError(format!("logging already initialized: {e}")))
}

fn filter_directive(level: &str) -> String {
    format!("{level},ragchat={level},tower_http=info")
}
