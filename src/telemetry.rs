//! Logging setup for binaries embedding the index
//!
//! The library itself only emits `tracing` events; installing a subscriber
//! is left to the process.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Base name of the rolling log file
pub const LOG_FILE_NAME: &str = "photon-index.log";

/// Console output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct LoggingOptions {
    /// Minimum level (trace, debug, info, warn, error); `RUST_LOG` adds directives
    pub level: String,
    pub format: LogFormat,
    /// Also write a daily rolling file here
    pub log_dir: Option<PathBuf>,
    pub ansi: bool,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            log_dir: None,
            ansi: true,
        }
    }
}

fn parse_level(level: &str) -> Result<tracing::Level> {
    level
        .parse::<tracing::Level>()
        .map_err(|e| Error::Settings(format!("Invalid log level '{}': {}", level, e)))
}

/// Install the global subscriber
///
/// Console output goes to stderr so command output on stdout stays parseable.
pub fn init_logging(options: &LoggingOptions) -> Result<()> {
    let level = parse_level(&options.level)?;
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    let console = match options.format {
        LogFormat::Pretty => fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(options.ansi)
            .boxed(),
        LogFormat::Json => fmt::layer().json().with_writer(std::io::stderr).boxed(),
    };

    let file = match &options.log_dir {
        Some(dir) => {
            fs::create_dir_all(dir)?;
            let appender = RollingFileAppender::new(Rotation::DAILY, dir, LOG_FILE_NAME);
            Some(fmt::layer().with_writer(appender).with_ansi(false))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .with(filter)
        .try_init()
        .map_err(|e| Error::Settings(format!("Logging already initialized: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_parsing() -> Result<()> {
        assert_eq!(parse_level("debug")?, tracing::Level::DEBUG);
        assert_eq!(parse_level("WARN")?, tracing::Level::WARN);
        assert!(matches!(parse_level("loud"), Err(Error::Settings(_))));
        Ok(())
    }

    #[test]
    fn test_format_names() {
        assert_eq!(serde_json::to_string(&LogFormat::Json).unwrap(), "\"json\"");
        assert_eq!(LogFormat::default(), LogFormat::Pretty);
    }
}
