// src/logging.rs

//! Logging setup for `assetpipe` using `tracing` + `tracing-subscriber`.
//!
//! The level applies to the `assetpipe` targets (`assetpipe::engine`,
//! `assetpipe::exec`, ...). Other crates log at `warn` or quieter. The level
//! comes from:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `ASSETPIPE_LOG`: either a level ("debug") or full filter directives
//!    ("info,assetpipe::engine=trace")
//! 3. default to `info`
//!
//! Logs are sent to STDERR; stdout is reserved for `--dry-run` output.

use anyhow::{Context, Result};
use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

use crate::cli::LogLevel;

/// Environment variable consulted when `--log-level` is not given.
pub const LOG_ENV_VAR: &str = "ASSETPIPE_LOG";

/// Initialise global logging subscriber.
///
/// Safe to call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let filter = match cli_level {
        Some(lvl) => default_filter(level_from_log_level(lvl))?,
        None => match std::env::var(LOG_ENV_VAR) {
            Ok(value) => filter_from_env_value(&value)?,
            Err(_) => default_filter(Level::INFO)?,
        },
    };

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

/// `level` for the pipeline's modules; dependencies (notify, globset, the
/// tokio internals) are capped at `warn`.
pub fn default_filter(level: Level) -> Result<EnvFilter> {
    let others = std::cmp::min(level, Level::WARN);
    let directives = format!("{},assetpipe={}", others, level).to_lowercase();
    EnvFilter::try_new(&directives).with_context(|| format!("building log filter '{}'", directives))
}

/// Interpret `ASSETPIPE_LOG`. A bare level goes through [`default_filter`];
/// anything else is taken as filter directives, falling back to `info` when
/// they do not parse.
pub fn filter_from_env_value(value: &str) -> Result<EnvFilter> {
    if let Some(level) = parse_level_str(value) {
        return default_filter(level);
    }
    match EnvFilter::try_new(value.trim()) {
        Ok(filter) => Ok(filter),
        Err(_) => default_filter(Level::INFO),
    }
}

fn level_from_log_level(lvl: LogLevel) -> Level {
    match lvl {
        LogLevel::Error => Level::ERROR,
        LogLevel::Warn => Level::WARN,
        LogLevel::Info => Level::INFO,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Trace => Level::TRACE,
    }
}

pub fn parse_level_str(s: &str) -> Option<Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(Level::ERROR),
        "warn" | "warning" => Some(Level::WARN),
        "info" => Some(Level::INFO),
        "debug" => Some(Level::DEBUG),
        "trace" => Some(Level::TRACE),
        _ => None,
    }
}
