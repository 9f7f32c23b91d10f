//! Application configuration
//!
//! Split into focused sub-modules:
//! - `server`: HTTP listener settings
//! - telemetry settings live with the pipeline in [`crate::telemetry`]

mod server;

use serde::{Deserialize, Serialize};

pub use server::ServerConfig;

use crate::telemetry::TelemetryConfig;

/// Prefix for environment variable overrides
pub const ENV_PREFIX: &str = "DICE";

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Tracing, metrics and logging configuration
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// Load configuration from `config.toml` and `DICE_*` environment variables
    ///
    /// Nested keys use a double underscore, e.g. `DICE_SERVER__PORT=9090` or
    /// `DICE_TELEMETRY__SAMPLING_RATIO=0.5`.
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from(config::Environment::with_prefix(ENV_PREFIX))
    }

    fn load_from(environment: config::Environment) -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            // Load from config file if exists
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                environment
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_source(vars: &[(&str, &str)]) -> config::Environment {
        let map = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        config::Environment::with_prefix(ENV_PREFIX).source(Some(map))
    }

    #[test]
    fn test_load_defaults() {
        let config = AppConfig::load_from(env_source(&[])).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.telemetry.service_name, "dice-service");
        assert_eq!(config.telemetry.service_version, "0.1.0");
    }

    #[test]
    fn test_env_overrides_nested_keys() {
        let config = AppConfig::load_from(env_source(&[
            ("DICE_SERVER__PORT", "9090"),
            ("DICE_TELEMETRY__SAMPLING_RATIO", "0.5"),
            ("DICE_TELEMETRY__SERVICE_NAME", "dice-canary"),
        ]))
        .unwrap();

        assert_eq!(config.server.port, 9090);
        assert!((config.telemetry.sampling_ratio - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.telemetry.service_name, "dice-canary");
    }

    #[test]
    fn test_config_serialization_round_trip() {
        let config = AppConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.server.port, config.server.port);
        assert_eq!(parsed.telemetry.service_name, config.telemetry.service_name);
    }
}
