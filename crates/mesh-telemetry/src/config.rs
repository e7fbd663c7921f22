//! Telemetry configuration from environment variables.

use std::env;

/// Logging configuration for one process.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name, recorded on the process root span
    pub service_name: String,

    /// Log level filter (trace, debug, info, warn, error or a full directive)
    pub log_level: String,

    /// Whether to write logs to stdout
    pub console_output: bool,

    /// Whether to emit JSON formatted logs
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "ping-mesh".to_string(),
            log_level: "info".to_string(),
            console_output: true,
            json_logs: false,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// - `PM_LOG_LEVEL` or `RUST_LOG`: log level (default: info)
    /// - `PM_CONSOLE_OUTPUT`: enable console output (default: true)
    /// - `PM_JSON_LOGS`: JSON logs (default: false in dev, true in containers)
    pub fn from_env() -> Self {
        let is_container =
            env::var("KUBERNETES_SERVICE_HOST").is_ok() || env::var("DOCKER_CONTAINER").is_ok();

        Self {
            service_name: "ping-mesh".to_string(),

            log_level: env::var("PM_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string()),

            console_output: env::var("PM_CONSOLE_OUTPUT")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(true),

            json_logs: env::var("PM_JSON_LOGS")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(is_container),
        }
    }

    /// Configuration for a named process (gateway or backend service).
    pub fn for_service(service_name: &str) -> Self {
        let mut config = Self::from_env();
        config.service_name = service_name.to_string();
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, "ping-mesh");
        assert_eq!(config.log_level, "info");
        assert!(config.console_output);
    }

    #[test]
    fn test_for_service() {
        let config = TelemetryConfig::for_service("SERVICE_A");
        assert_eq!(config.service_name, "SERVICE_A");
    }
}
