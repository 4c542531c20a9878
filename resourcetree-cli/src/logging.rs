//! Logging setup.
//!
//! Logs go to stderr. When `logging.directory` is configured they are also
//! written to a daily rolling file in that directory through a non-blocking
//! writer; the returned guard must be held until exit so buffered lines are
//! flushed.

use resourcetree::config::LoggingSection;
use time::format_description::well_known::Rfc3339;
use time::UtcOffset;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::OffsetTime;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::CliError;

const LOG_FILE_PREFIX: &str = "resourcetree.log";

/// Filter directive for the configured level and `-v` count.
fn level_directive(configured: &str, verbose: u8) -> &str {
    match verbose {
        0 => configured,
        1 => "debug",
        _ => "trace",
    }
}

/// Install the global subscriber.
pub fn init(logging: &LoggingSection, verbose: u8) -> Result<Option<WorkerGuard>, CliError> {
    let filter = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) if !directives.is_empty() => EnvFilter::try_new(directives),
        _ => EnvFilter::try_new(level_directive(&logging.level, verbose)),
    }
    .map_err(|e| CliError::Logging(e.to_string()))?;

    // Must run before any thread is spawned for the local offset to resolve.
    let timer = OffsetTime::local_rfc_3339()
        .unwrap_or_else(|_| OffsetTime::new(UtcOffset::UTC, Rfc3339));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_timer(timer.clone());

    let (file_layer, guard) = match &logging.directory {
        Some(directory) => {
            std::fs::create_dir_all(directory)?;
            let appender = tracing_appender::rolling::daily(directory, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_timer(timer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| CliError::Logging(e.to_string()))?;

    if let Some(directory) = &logging.directory {
        tracing::debug!(directory = %directory.display(), "File logging enabled");
    }
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_directive() {
        assert_eq!(level_directive("warn", 0), "warn");
        assert_eq!(level_directive("warn", 1), "debug");
        assert_eq!(level_directive("warn", 5), "trace");
    }

    #[test]
    fn test_configured_levels_are_valid_filters() {
        for level in ["error", "warn", "info", "debug", "trace", "resourcetree=debug"] {
            assert!(EnvFilter::try_new(level_directive(level, 0)).is_ok());
        }
    }
}
