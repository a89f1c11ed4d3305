//! Configuration module.
//!
//! Loads and validates signal-engine's configuration from a YAML file, with
//! `${VAR}` / `${VAR:-default}` environment variable interpolation.
//!
//! # Usage
//!
//! ```rust,ignore
//! use signal_engine::infrastructure::config::load_config;
//!
//! let config = load_config(Some("config.yaml"))?;
//! println!("health port: {}", config.server.health_port);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// Failed to parse the YAML configuration.
    #[error("failed to parse config YAML: {0}")]
    ParseError(#[from] serde_yaml_bw::Error),
    /// Configuration failed cross-field validation.
    #[error("config validation failed: {0}")]
    ValidationError(String),
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
}

/// Broker connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Manager endpoint host.
    #[serde(default = "default_broker_host")]
    pub host: String,
    /// Manager endpoint port.
    #[serde(default = "default_broker_port")]
    pub port: u16,
    /// Manager login account.
    #[serde(default)]
    pub login: i64,
    /// Manager password.
    #[serde(default)]
    pub password: String,
    /// Use the in-process synthetic broker instead of dialing a real one.
    #[serde(default = "default_true")]
    pub mock_mode: bool,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: default_broker_host(),
            port: default_broker_port(),
            login: 0,
            password: String::new(),
            mock_mode: true,
        }
    }
}

fn default_broker_host() -> String {
    "127.0.0.1".to_string()
}
const fn default_broker_port() -> u16 {
    443
}
const fn default_true() -> bool {
    true
}

/// Signal ingestion loop tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfigYaml {
    /// Path to the advisor's journal file.
    #[serde(default = "default_journal_path")]
    pub journal_path: String,
    /// Debounce window after a filesystem event, in seconds.
    #[serde(default = "default_debounce_secs")]
    pub debounce_secs: u64,
    /// Polling backstop interval, in seconds, independent of filesystem
    /// notifications.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl Default for IngestionConfigYaml {
    fn default() -> Self {
        Self {
            journal_path: default_journal_path(),
            debounce_secs: default_debounce_secs(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

fn default_journal_path() -> String {
    "signals.json".to_string()
}
const fn default_debounce_secs() -> u64 {
    1
}
const fn default_poll_interval_secs() -> u64 {
    5
}

/// Order Client retry tuning.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    #[serde(default = "default_retry_max_attempts")]
    pub max_attempts: u32,
    /// Flat delay between attempts, in seconds.
    #[serde(default = "default_retry_backoff_secs")]
    pub backoff_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_retry_max_attempts(),
            backoff_secs: default_retry_backoff_secs(),
        }
    }
}

const fn default_retry_max_attempts() -> u32 {
    3
}
const fn default_retry_backoff_secs() -> u64 {
    2
}

impl RetryConfig {
    /// This policy's backoff as a [`Duration`].
    #[must_use]
    pub const fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_secs)
    }
}

/// Ambient server ports.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Health check HTTP port.
    #[serde(default = "default_health_port")]
    pub health_port: u16,
    /// Prometheus metrics port (0 = disabled).
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            health_port: default_health_port(),
            metrics_port: default_metrics_port(),
        }
    }
}

const fn default_health_port() -> u16 {
    8083
}
const fn default_metrics_port() -> u16 {
    9091
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Minimum log level.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format: "json" or "pretty".
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Ambient server ports.
    #[serde(default)]
    pub server: ServerConfig,
    /// Broker connection settings.
    #[serde(default)]
    pub broker: BrokerConfig,
    /// Signal ingestion loop tuning.
    #[serde(default)]
    pub ingestion: IngestionConfigYaml,
    /// Order Client retry tuning.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Load configuration from a YAML file with environment variable
/// interpolation.
///
/// # Errors
/// Returns a [`ConfigError`] if the file cannot be read, parsed, or
/// validated.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or("config.yaml");
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_string(),
        source: e,
    })?;
    load_config_from_string(&contents)
}

/// Load configuration from a YAML string (useful for testing).
///
/// # Errors
/// Returns a [`ConfigError`] if the YAML cannot be parsed or validated.
pub fn load_config_from_string(yaml: &str) -> Result<Config, ConfigError> {
    let interpolated = interpolate_env_vars(yaml);
    let config: Config = serde_yaml_bw::from_str(&interpolated)?;
    validate_config(&config)?;
    Ok(config)
}

/// Interpolate environment variables in a string.
///
/// Supports both `${VAR}` and `${VAR:-default}` syntax.
fn interpolate_env_vars(input: &str) -> String {
    use std::sync::OnceLock;

    static ENV_VAR_REGEX: OnceLock<regex::Regex> = OnceLock::new();

    let mut result = input.to_string();
    let re = ENV_VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("env var regex is valid")
    });

    for cap in re.captures_iter(input) {
        let Some(full_match) = cap.get(0) else {
            continue;
        };
        let Some(var_match) = cap.get(1) else {
            continue;
        };
        let full_match = full_match.as_str();
        let var_name = var_match.as_str();
        let default_value = cap.get(2).map(|m| m.as_str());

        let value = match std::env::var(var_name) {
            Ok(v) if !v.is_empty() => v,
            _ => default_value.map_or_else(String::new, str::to_string),
        };

        result = result.replace(full_match, &value);
    }

    result
}

/// Validate configuration values.
fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.metrics_port != 0 && config.server.health_port == config.server.metrics_port
    {
        return Err(ConfigError::ValidationError(
            "health_port and metrics_port must be different".to_string(),
        ));
    }

    if config.retry.max_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "retry.max_attempts must be at least 1".to_string(),
        ));
    }

    if !config.broker.mock_mode && config.broker.password.is_empty() {
        return Err(ConfigError::ValidationError(
            "broker.password is required when broker.mock_mode is false".to_string(),
        ));
    }

    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.logging.level.as_str()) {
        return Err(ConfigError::ValidationError(format!(
            "logging.level must be one of: {valid_levels:?}"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.server.health_port, 8083);
        assert!(config.broker.mock_mode);
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn load_minimal_config() {
        let yaml = "broker:\n  mock_mode: true\n";
        let config = load_config_from_string(yaml).expect("should load minimal config");
        assert_eq!(config.ingestion.debounce_secs, 1);
    }

    #[test]
    fn env_var_with_default_when_missing() {
        let input = "mode: ${SIGNAL_ENGINE_TEST_NONEXISTENT_VAR:-PAPER}";
        assert_eq!(interpolate_env_vars(input), "mode: PAPER");
    }

    #[test]
    fn env_var_without_default_becomes_empty() {
        let input = "api_key: ${SIGNAL_ENGINE_TEST_UNLIKELY_TO_EXIST}";
        assert_eq!(interpolate_env_vars(input), "api_key: ");
    }

    #[test]
    fn validation_rejects_same_ports() {
        let yaml = "server:\n  health_port: 9000\n  metrics_port: 9000\n";
        let err = load_config_from_string(yaml).unwrap_err();
        assert!(err.to_string().contains("must be different"));
    }

    #[test]
    fn validation_requires_password_outside_mock_mode() {
        let yaml = "broker:\n  mock_mode: false\n";
        let err = load_config_from_string(yaml).unwrap_err();
        assert!(err.to_string().contains("password"));
    }

    #[test]
    fn validation_rejects_unknown_log_level() {
        let yaml = "logging:\n  level: verbose\n";
        let err = load_config_from_string(yaml).unwrap_err();
        assert!(err.to_string().contains("logging.level"));
    }

    #[test]
    fn retry_config_backoff_duration() {
        let retry = RetryConfig {
            max_attempts: 3,
            backoff_secs: 2,
        };
        assert_eq!(retry.backoff(), Duration::from_secs(2));
    }
}
