//! Tracing setup for the executables
//!
//! Logs go to stderr. With a log directory, a daily-rolling file is written
//! there too through a non-blocking writer; keep the returned guard alive
//! until exit or buffered lines are lost.

use crate::error::{RelayError, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when neither `--log-level` nor `RUST_LOG` is set
pub const DEFAULT_FILTER: &str = "info,ohlcv_relay=debug";

/// Build the event filter
///
/// An explicit level wins over `RUST_LOG`, which wins over
/// [`DEFAULT_FILTER`].
pub fn filter(level: Option<&str>) -> Result<EnvFilter> {
    match level {
        Some(level) => EnvFilter::try_new(level)
            .map_err(|e| RelayError::Config(format!("Invalid log level '{}': {}", level, e))),
        None => Ok(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))),
    }
}

/// Install the global subscriber
///
/// `file_name` is the prefix of the rolling log file inside `log_dir`.
pub fn init(
    level: Option<&str>,
    log_dir: Option<&Path>,
    file_name: &str,
) -> Result<Option<WorkerGuard>> {
    let filter = filter(level)?;

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|e| {
                RelayError::Config(format!("Cannot create log directory {:?}: {}", dir, e))
            })?;
            let appender = tracing_appender::rolling::daily(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .map_err(|e| RelayError::Config(format!("Logging already initialised: {}", e)))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_level_is_used() {
        let filter = filter(Some("warn,ohlcv_relay=trace")).unwrap();
        assert!(filter.to_string().contains("ohlcv_relay=trace"));
    }

    #[test]
    fn test_invalid_level_is_config_error() {
        assert!(matches!(
            filter(Some("ohlcv_relay=loudest")),
            Err(RelayError::Config(_))
        ));
    }
}
