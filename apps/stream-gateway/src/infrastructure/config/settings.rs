//! Gateway configuration settings, loaded from environment variables.

use std::time::Duration;

/// Broker manager connection settings.
#[derive(Debug, Clone)]
pub struct BrokerSettings {
    /// Manager endpoint host.
    pub host: String,
    /// Manager endpoint port.
    pub port: u16,
    /// Manager login account.
    pub login: i64,
    /// Manager password.
    pub password: String,
    /// Use the in-process synthetic broker instead of dialing a real one.
    pub mock_mode: bool,
}

impl std::fmt::Display for BrokerSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{} (login {}, mock={})",
            self.host, self.port, self.login, self.mock_mode
        )
    }
}

/// Pumping Adapter tuning.
#[derive(Debug, Clone)]
pub struct PumpingSettings {
    /// Capacity of the handoff channel between the broker callback and the
    /// decode task.
    pub handoff_capacity: usize,
    /// How long to wait for `PumpingStarted` before giving up.
    pub startup_window: Duration,
    /// Interval the broker is expected to ping on.
    pub ping_interval: Duration,
    /// How long to wait for a ping before declaring the connection lost.
    pub pong_deadline: Duration,
}

impl Default for PumpingSettings {
    fn default() -> Self {
        Self {
            handoff_capacity: 4_096,
            startup_window: Duration::from_secs(10),
            ping_interval: Duration::from_secs(20),
            pong_deadline: Duration::from_secs(45),
        }
    }
}

/// Event Dispatcher tuning.
#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    /// Capacity of each subscriber's bounded mailbox.
    pub subscriber_mailbox_capacity: usize,
    /// Number of distinct order ids retained in the trade cache before LRU
    /// eviction.
    pub trade_cache_capacity: usize,
    /// Optional per-subscriber quote rate limit (updates/second/symbol), if
    /// enabled.
    pub max_quote_updates_per_second: Option<u32>,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            subscriber_mailbox_capacity: 1_024,
            trade_cache_capacity: 10_000,
            max_quote_updates_per_second: None,
        }
    }
}

/// Streaming Gateway tuning.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    /// Address the WebSocket server binds to.
    pub bind_addr: std::net::SocketAddr,
    /// Capacity of each client's outbound mailbox.
    pub client_mailbox_capacity: usize,
    /// Whether `subscribe`/`get_quotes` require a successful prior `auth`.
    pub require_auth: bool,
    /// Shared secret used to verify bearer tokens.
    pub bearer_secret: String,
    /// Interval the server expects a client `ping` on.
    pub ping_interval: Duration,
    /// How long to wait for a client ping before disconnecting it.
    pub pong_deadline: Duration,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            bind_addr: ([0, 0, 0, 0], 8090).into(),
            client_mailbox_capacity: 256,
            require_auth: true,
            bearer_secret: String::new(),
            ping_interval: Duration::from_secs(30),
            pong_deadline: Duration::from_secs(60),
        }
    }
}

/// Server port settings for the ambient health/metrics endpoints.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Health check HTTP port.
    pub health_port: u16,
    /// Prometheus metrics port (0 = disabled).
    pub metrics_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            health_port: 8082,
            metrics_port: 9090,
        }
    }
}

/// Complete gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayProcessConfig {
    /// Broker connection settings.
    pub broker: BrokerSettings,
    /// Pumping Adapter tuning.
    pub pumping: PumpingSettings,
    /// Event Dispatcher tuning.
    pub dispatcher: DispatcherSettings,
    /// Streaming Gateway tuning.
    pub gateway: GatewaySettings,
    /// Ambient server ports.
    pub server: ServerSettings,
}

impl GatewayProcessConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    /// Returns [`ConfigError::MissingEnvVar`] if a required variable is
    /// absent, or [`ConfigError::EmptyValue`] if it is present but empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mock_mode = parse_env_bool("GATEWAY_MOCK_MODE", true);

        let broker = BrokerSettings {
            host: std::env::var("BROKER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: parse_env_u16("BROKER_PORT", 443),
            login: parse_env_i64("BROKER_LOGIN", 0),
            password: std::env::var("BROKER_PASSWORD").unwrap_or_default(),
            mock_mode,
        };

        if !mock_mode && broker.password.is_empty() {
            return Err(ConfigError::EmptyValue("BROKER_PASSWORD".to_string()));
        }

        let bearer_secret = std::env::var("GATEWAY_BEARER_SECRET")
            .map_err(|_| ConfigError::MissingEnvVar("GATEWAY_BEARER_SECRET".to_string()))?;
        if bearer_secret.is_empty() {
            return Err(ConfigError::EmptyValue("GATEWAY_BEARER_SECRET".to_string()));
        }

        let pumping = PumpingSettings {
            handoff_capacity: parse_env_usize(
                "PUMPING_HANDOFF_CAPACITY",
                PumpingSettings::default().handoff_capacity,
            ),
            startup_window: parse_env_duration_secs(
                "PUMPING_STARTUP_WINDOW_SECS",
                PumpingSettings::default().startup_window,
            ),
            ping_interval: parse_env_duration_secs(
                "PUMPING_PING_INTERVAL_SECS",
                PumpingSettings::default().ping_interval,
            ),
            pong_deadline: parse_env_duration_secs(
                "PUMPING_PONG_DEADLINE_SECS",
                PumpingSettings::default().pong_deadline,
            ),
        };

        let dispatcher = DispatcherSettings {
            subscriber_mailbox_capacity: parse_env_usize(
                "DISPATCHER_SUBSCRIBER_MAILBOX_CAPACITY",
                DispatcherSettings::default().subscriber_mailbox_capacity,
            ),
            trade_cache_capacity: parse_env_usize(
                "DISPATCHER_TRADE_CACHE_CAPACITY",
                DispatcherSettings::default().trade_cache_capacity,
            ),
            max_quote_updates_per_second: std::env::var("DISPATCHER_MAX_QUOTE_UPDATES_PER_SECOND")
                .ok()
                .and_then(|v| v.parse().ok()),
        };

        let bind_port = parse_env_u16("GATEWAY_PORT", GatewaySettings::default().bind_addr.port());
        let gateway = GatewaySettings {
            bind_addr: ([0, 0, 0, 0], bind_port).into(),
            client_mailbox_capacity: parse_env_usize(
                "GATEWAY_CLIENT_MAILBOX_CAPACITY",
                GatewaySettings::default().client_mailbox_capacity,
            ),
            require_auth: parse_env_bool(
                "GATEWAY_REQUIRE_AUTH",
                GatewaySettings::default().require_auth,
            ),
            bearer_secret,
            ping_interval: parse_env_duration_secs(
                "GATEWAY_PING_INTERVAL_SECS",
                GatewaySettings::default().ping_interval,
            ),
            pong_deadline: parse_env_duration_secs(
                "GATEWAY_PONG_DEADLINE_SECS",
                GatewaySettings::default().pong_deadline,
            ),
        };

        let server = ServerSettings {
            health_port: parse_env_u16("GATEWAY_HEALTH_PORT", ServerSettings::default().health_port),
            metrics_port: parse_env_u16(
                "GATEWAY_METRICS_PORT",
                ServerSettings::default().metrics_port,
            ),
        };

        Ok(Self {
            broker,
            pumping,
            dispatcher,
            gateway,
            server,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
}

fn parse_env_u16(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broker_settings_display_redacts_password() {
        let settings = BrokerSettings {
            host: "mgr.example.com".to_string(),
            port: 443,
            login: 1001,
            password: "super-secret".to_string(),
            mock_mode: true,
        };
        let shown = settings.to_string();
        assert!(!shown.contains("super-secret"));
        assert!(shown.contains("1001"));
    }

    #[test]
    fn pumping_settings_defaults() {
        let settings = PumpingSettings::default();
        assert_eq!(settings.handoff_capacity, 4_096);
        assert_eq!(settings.startup_window, Duration::from_secs(10));
    }

    #[test]
    fn dispatcher_settings_defaults_have_no_rate_limit() {
        let settings = DispatcherSettings::default();
        assert!(settings.max_quote_updates_per_second.is_none());
    }

    #[test]
    fn gateway_settings_defaults_require_auth() {
        let settings = GatewaySettings::default();
        assert!(settings.require_auth);
        assert_eq!(settings.bind_addr.port(), 8090);
    }

    #[test]
    fn server_settings_defaults() {
        let settings = ServerSettings::default();
        assert_eq!(settings.health_port, 8082);
        assert_eq!(settings.metrics_port, 9090);
    }
}
