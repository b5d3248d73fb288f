//! Logging system configuration and initialization
//!
//! This module provides the logging setup with:
//! - Console and/or file output
//! - Daily or no rotation for the file output
//! - Structured JSON logging for the file (optional)
//! - Local time stamps with UTC offset
//! - Noise suppression for HTTP and runtime internals unless TRACE is requested

#![allow(clippy::uninlined_format_args)]

use anyhow::{Result, anyhow};
use chrono::Local;
use lazy_static::lazy_static;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{Subscriber, info};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, time::FormatTime},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
};

pub use crate::infrastructure::config::LoggingConfig;

// Keeps the non-blocking file writers alive for the life of the process
lazy_static! {
    static ref LOG_GUARDS: Mutex<Vec<tracing_appender::non_blocking::WorkerGuard>> =
        Mutex::new(Vec::new());
}

/// Local time with explicit offset, millisecond precision
struct LocalTimeFormatter;

impl FormatTime for LocalTimeFormatter {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%d %H:%M:%S%.3f %:z"))
    }
}

/// Resolve the configured log directory against the working directory
pub fn get_log_directory(config: &LoggingConfig) -> PathBuf {
    if config.log_dir.is_absolute() {
        return config.log_dir.clone();
    }
    std::env::current_dir()
        .unwrap_or_default()
        .join(&config.log_dir)
}

/// Initialize the logging system with default configuration
pub fn init_logging() -> Result<()> {
    init_logging_with_config(LoggingConfig::default())
}

/// Filter honouring `RUST_LOG`, falling back to the configured level.
///
/// Unless the level is `trace`, HTTP client and runtime internals are held to
/// info/warn so image fetch chatter does not drown the run log:
/// ```bash
/// # Show detailed HTTP logs
/// RUST_LOG="debug,reqwest=debug,hyper=debug" listing-harvester run
/// ```
fn build_env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let mut filter = EnvFilter::try_new(&config.level)
        .map_err(|e| anyhow!("Invalid log level '{}': {}", config.level, e))?;

    if !config.level.to_lowercase().contains("trace") {
        for directive in [
            "reqwest=info",
            "hyper=warn",
            "hyper_util=warn",
            "h2=warn",
            "tokio=info",
            "runtime=warn",
        ] {
            filter = filter.add_directive(
                directive
                    .parse()
                    .map_err(|e| anyhow!("Invalid log directive '{}': {}", directive, e))?,
            );
        }
    }

    Ok(filter)
}

fn file_writer(
    log_dir: &Path,
    config: &LoggingConfig,
) -> Result<tracing_appender::non_blocking::NonBlocking> {
    std::fs::create_dir_all(log_dir)
        .map_err(|e| anyhow!("Failed to create log directory {:?}: {}", log_dir, e))?;

    let appender = match config.rotation.as_str() {
        "daily" => rolling::daily(log_dir, &config.file_name),
        _ => rolling::never(log_dir, &config.file_name),
    };
    let (writer, guard) = non_blocking(appender);

    LOG_GUARDS
        .lock()
        .map_err(|_| anyhow!("Log guard registry poisoned"))?
        .push(guard);

    Ok(writer)
}

/// Console layer for whatever stack it ends up on top of
fn console_layer<S>(enabled: bool) -> Option<impl Layer<S>>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    enabled.then(|| {
        fmt::Layer::new()
            .with_writer(std::io::stdout)
            .with_timer(LocalTimeFormatter)
            .with_target(false)
    })
}

/// Initialize logging with custom configuration
pub fn init_logging_with_config(config: LoggingConfig) -> Result<()> {
    let log_dir = get_log_directory(&config);
    let registry = Registry::default().with(build_env_filter(&config)?);

    match (config.file_output, config.json_format) {
        (false, _) if !config.console_output => {
            return Err(anyhow!("No logging output configured"));
        }
        (false, _) => {
            registry
                .with(console_layer(config.console_output))
                .try_init()
                .map_err(|e| anyhow!("Failed to install subscriber: {}", e))?;
        }
        (true, true) => {
            let file_layer = fmt::Layer::new()
                .json()
                .with_writer(file_writer(&log_dir, &config)?)
                .with_timer(LocalTimeFormatter)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_ansi(false);
            registry
                .with(file_layer)
                .with(console_layer(config.console_output))
                .try_init()
                .map_err(|e| anyhow!("Failed to install subscriber: {}", e))?;
        }
        (true, false) => {
            let file_layer = fmt::Layer::new()
                .with_writer(file_writer(&log_dir, &config)?)
                .with_timer(LocalTimeFormatter)
                .with_target(false)
                .with_ansi(false);
            registry
                .with(file_layer)
                .with(console_layer(config.console_output))
                .try_init()
                .map_err(|e| anyhow!("Failed to install subscriber: {}", e))?;
        }
    }

    info!("Logging system initialized");
    info!("Log level: {}", config.level);
    if config.file_output {
        info!("Log directory: {:?}", log_dir);
        info!("JSON format: {}", config.json_format);
    }

    Ok(())
}

/// Log system information for diagnostics
pub fn log_system_info() {
    info!("=== Listing Harvester System Information ===");
    info!("Application version: {}", env!("CARGO_PKG_VERSION"));
    info!("Operating system: {}", std::env::consts::OS);
    info!("Architecture: {}", std::env::consts::ARCH);

    if let Ok(current_dir) = std::env::current_dir() {
        info!("Working directory: {:?}", current_dir);
    }
    info!("============================================");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_config_default() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert!(config.console_output);
        assert!(config.file_output);
        assert!(!config.json_format);
        assert_eq!(config.rotation, "daily");
    }

    #[test]
    fn relative_log_dir_resolves_under_working_dir() {
        let config = LoggingConfig::default();
        let dir = get_log_directory(&config);
        assert!(dir.is_absolute() || dir == PathBuf::from("logs"));
        assert!(dir.ends_with("logs"));
    }

    #[test]
    fn no_output_is_rejected() {
        let config = LoggingConfig {
            console_output: false,
            file_output: false,
            ..LoggingConfig::default()
        };
        assert!(init_logging_with_config(config).is_err());
    }

    #[test]
    fn console_layer_stacks_on_file_layer() {
        assert!(console_layer::<Registry>(false).is_none());

        let subscriber = Registry::default()
            .with(EnvFilter::new("info"))
            .with(fmt::Layer::new().json().with_writer(std::io::sink))
            .with(console_layer(true));
        tracing::subscriber::with_default(subscriber, || info!("both layers installed"));
    }

    #[test]
    fn invalid_level_is_rejected() {
        let config = LoggingConfig {
            level: "loud=[[".to_string(),
            ..LoggingConfig::default()
        };
        // RUST_LOG takes precedence when set, which would mask the bad level.
        if std::env::var("RUST_LOG").is_err() {
            assert!(build_env_filter(&config).is_err());
        }
    }
}
