//! # rt-telemetry
//!
//! Structured logging and metrics for the virtual-transport runtime:
//! `tracing` + `tracing-subscriber` for structured logs, a `prometheus`
//! counter registry for metrics. No OTLP/Loki exporter ships: this crate
//! carries the ambient shape of a logging/metrics stack without shipping
//! a tracing backend, since tracing backends are explicitly out of scope.
//!
//! ```rust,ignore
//! use rt_telemetry::{TelemetryConfig, init_telemetry};
//!
//! let config = TelemetryConfig::from_env();
//! let _guard = init_telemetry(config)?;
//! // managers now emit structured spans; counters are registered.
//! ```

mod config;
mod context;
mod logging;
mod metrics;
mod tracing_setup;

pub use config::TelemetryConfig;
pub use context::{PropagatedContext, TraceContext};
pub use logging::LoggingGuard;
pub use metrics::{
    register_metrics, MetricsHandle, BROADCASTS_SENT, EPOCHS_OPENED, EPOCHS_TERMINATED,
    LOCATION_CACHE_HITS, LOCATION_CACHE_MISSES, MESSAGES_DISPATCHED, MESSAGES_SENT, MIGRATIONS,
    RDMA_GETS_SERVED, RDMA_PUTS_SERVED, REDUCTIONS_COMPLETED, SUBSYSTEM_ERRORS,
};
pub use tracing_setup::{DispatchTimer, TracingGuard};

use thiserror::Error;

/// Telemetry initialization errors.
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("failed to initialize metrics: {0}")]
    MetricsInit(String),
    #[error("invalid telemetry configuration: {0}")]
    Config(String),
}

/// Initialize the process-wide logging + metrics stack. Returns a guard
/// that must be held for the process lifetime.
///
/// # Errors
///
/// Propagates [`TelemetryError`] from either metrics registration or
/// subscriber installation.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let metrics = register_metrics()?;
    let tracing_guard = tracing_setup::init_tracing();
    let logging_guard = logging::init_logging(&config)?;

    Ok(TelemetryGuard {
        _tracing: tracing_guard,
        _logging: logging_guard,
        _metrics: metrics,
    })
}

/// Guard that keeps telemetry active. Drop to release.
pub struct TelemetryGuard {
    _tracing: TracingGuard,
    _logging: LoggingGuard,
    _metrics: MetricsHandle,
}

/// Open a span carrying the standard manager/node/epoch fields, the
/// runtime's analogue of `quantum_telemetry::subsystem_span!`.
#[macro_export]
macro_rules! manager_span {
    ($name:expr, $($field:tt)*) => {
        tracing::debug_span!($name, $($field)*)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_from_env_has_defaults() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, "vt-runtime");
    }
}
