//! Structured logging setup: a local
//! `tracing-subscriber` fmt/json layer, since the OTLP/Loki backends are
//! out of scope.

use crate::config::TelemetryConfig;
use crate::TelemetryError;
use tracing_subscriber::EnvFilter;

/// Guard returned by [`init_logging`]; dropping it is a no-op today but
/// gives callers a symmetric RAII handle if a flushed backend is added
/// later.
pub struct LoggingGuard;

/// Install the process-wide `tracing` subscriber.
///
/// # Errors
///
/// Returns [`TelemetryError::Config`] if `config.log_level` is not a valid
/// `EnvFilter` directive string.
pub fn init_logging(config: &TelemetryConfig) -> Result<LoggingGuard, TelemetryError> {
    let filter = EnvFilter::try_new(&config.log_level)
        .map_err(|e| TelemetryError::Config(format!("invalid log level {:?}: {e}", config.log_level)))?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let result = if config.json_logs {
        subscriber.json().try_init()
    } else {
        subscriber.try_init()
    };

    // A subscriber may already be installed (e.g. a prior test in the same
    // process); that is not a fatal misconfiguration here.
    if let Err(e) = result {
        tracing::debug!("tracing subscriber already initialized: {e}");
    }

    Ok(LoggingGuard)
}
