//! Telemetry configuration for the process-wide logging/metrics stack,
//! loadable from the environment via `TelemetryConfig::from_env`.

use std::env;

/// Configuration for the process-wide logging/metrics stack.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Name attached to every log line and span (`RT_SERVICE_NAME`).
    pub service_name: String,
    /// `tracing_subscriber::EnvFilter` directive string (`RT_LOG_LEVEL`).
    pub log_level: String,
    /// Emit logs as JSON lines instead of the human-readable formatter
    /// (`RT_LOG_JSON`).
    pub json_logs: bool,
    /// This node's id, attached to every span as the `node` field
    /// (`RT_NODE_ID`).
    pub node_id: u32,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "vt-runtime".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
            node_id: 0,
        }
    }
}

impl TelemetryConfig {
    /// Read overrides from the environment, falling back to defaults for
    /// anything unset or unparseable.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            service_name: env::var("RT_SERVICE_NAME").unwrap_or(defaults.service_name),
            log_level: env::var("RT_LOG_LEVEL").unwrap_or(defaults.log_level),
            json_logs: env::var("RT_LOG_JSON")
                .ok()
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(defaults.json_logs),
            node_id: env::var("RT_NODE_ID")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.node_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, "vt-runtime");
        assert!(!config.json_logs);
    }
}
