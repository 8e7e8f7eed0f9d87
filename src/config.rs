//! Configuration module for loading and parsing TOML configuration files.

use crate::backoff::BackoffPolicy;
use crate::models::{ChannelEndpoint, ChannelKey, ChannelKind};
use crate::projection::ProjectionSettings;
use crate::registry::RegistrySettings;
use gateway_client::ClientConfig;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration error types.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse TOML configuration.
    #[error("failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    /// Invalid configuration value.
    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Broker gateway endpoints.
    pub gateway: GatewayConfig,
    /// Socket and reconnect tuning.
    pub stream: StreamConfig,
    /// UI projection tuning.
    pub projection: ProjectionConfig,
    /// Backend health polling.
    pub health: HealthConfig,
    /// Channels connected at startup.
    pub channels: Vec<ChannelConfig>,
}

/// Broker gateway configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// REST base URL.
    pub base_url: String,
    /// WebSocket base URL; derived from `base_url` when absent.
    pub ws_base_url: Option<String>,
    /// Path of the stream session init call.
    pub init_path: String,
    /// Path of the health endpoint.
    pub health_path: String,
    /// REST request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            ws_base_url: None,
            init_path: gateway_client::DEFAULT_INIT_PATH.to_string(),
            health_path: gateway_client::DEFAULT_HEALTH_PATH.to_string(),
            timeout_ms: 10_000,
        }
    }
}

impl GatewayConfig {
    /// REST client configuration.
    #[must_use]
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.base_url.clone(),
            timeout: Duration::from_millis(self.timeout_ms),
            init_path: self.init_path.clone(),
            health_path: self.health_path.clone(),
        }
    }
}

/// Socket and reconnect configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Delay before the first reconnect, in milliseconds.
    pub backoff_base_ms: u64,
    /// Upper bound on a reconnect delay, in milliseconds.
    pub backoff_cap_ms: u64,
    /// Reconnects allowed before a channel gives up.
    pub max_attempts: u32,
    /// Heartbeat liveness window, in milliseconds.
    pub heartbeat_window_ms: u64,
    /// WebSocket handshake timeout, in milliseconds.
    pub connect_timeout_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            backoff_base_ms: 1000,
            backoff_cap_ms: 10_000,
            max_attempts: 5,
            heartbeat_window_ms: 10_000,
            connect_timeout_ms: 10_000,
        }
    }
}

impl StreamConfig {
    /// Reconnect policy.
    #[must_use]
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_millis(self.backoff_base_ms),
            Duration::from_millis(self.backoff_cap_ms),
            self.max_attempts,
        )
    }

    /// Handshake timeout.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Projection configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProjectionConfig {
    /// Minimum interval between UI views, in milliseconds.
    pub throttle_ms: u64,
    /// Age after which data is flagged stale, in milliseconds.
    pub stale_after_ms: u64,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            throttle_ms: 100,
            stale_after_ms: 15_000,
        }
    }
}

impl ProjectionConfig {
    /// Projection settings.
    #[must_use]
    pub fn settings(&self) -> ProjectionSettings {
        ProjectionSettings {
            interval: Duration::from_millis(self.throttle_ms),
            stale_after: Duration::from_millis(self.stale_after_ms),
        }
    }
}

/// Health polling configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Whether the health monitor runs.
    pub enabled: bool,
    /// Poll interval in milliseconds.
    pub interval_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 5000,
        }
    }
}

/// A channel connected at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
    /// Channel kind.
    pub kind: ChannelKind,
    /// Underlying symbol (e.g., "NIFTY").
    pub symbol: String,
    /// Expiry for option chain channels.
    #[serde(default)]
    pub expiry: Option<String>,
    /// Explicit key; derived from symbol and kind when absent.
    #[serde(default)]
    pub key: Option<String>,
}

impl ChannelConfig {
    /// Endpoint of this channel.
    #[must_use]
    pub fn endpoint(&self) -> ChannelEndpoint {
        ChannelEndpoint {
            kind: self.kind,
            symbol: self.symbol.clone(),
            expiry: self.expiry.clone(),
        }
    }

    /// Key of this channel.
    #[must_use]
    pub fn channel_key(&self) -> ChannelKey {
        match &self.key {
            Some(key) => ChannelKey::new(key.as_str()),
            None => self.endpoint().default_key(),
        }
    }
}

impl Config {
    /// Loads configuration from a TOML file.
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file.
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Arguments
    /// * `content` - TOML content as string.
    ///
    /// # Errors
    /// Returns error if content cannot be parsed.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// WebSocket base URL: explicit, or `base_url` with its scheme swapped.
    #[must_use]
    pub fn ws_base_url(&self) -> String {
        match &self.gateway.ws_base_url {
            Some(url) => url.clone(),
            None => http_to_ws(&self.gateway.base_url),
        }
    }

    /// Registry settings.
    #[must_use]
    pub fn registry_settings(&self) -> RegistrySettings {
        RegistrySettings {
            backoff: self.stream.backoff(),
            heartbeat_window: Duration::from_millis(self.stream.heartbeat_window_ms),
            ws_base_url: self.ws_base_url(),
        }
    }

    /// Validates the configuration values.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.gateway.base_url.is_empty() {
            return Err(ConfigError::InvalidValue(
                "gateway base_url cannot be empty".to_string(),
            ));
        }

        let durations = [
            ("gateway.timeout_ms", self.gateway.timeout_ms),
            ("stream.backoff_base_ms", self.stream.backoff_base_ms),
            ("stream.backoff_cap_ms", self.stream.backoff_cap_ms),
            ("stream.heartbeat_window_ms", self.stream.heartbeat_window_ms),
            ("stream.connect_timeout_ms", self.stream.connect_timeout_ms),
            ("projection.throttle_ms", self.projection.throttle_ms),
            ("projection.stale_after_ms", self.projection.stale_after_ms),
            ("health.interval_ms", self.health.interval_ms),
        ];
        for (name, value) in durations {
            if value == 0 {
                return Err(ConfigError::InvalidValue(format!(
                    "{} must be positive",
                    name
                )));
            }
        }

        if self.stream.backoff_cap_ms < self.stream.backoff_base_ms {
            return Err(ConfigError::InvalidValue(
                "stream.backoff_cap_ms must be >= backoff_base_ms".to_string(),
            ));
        }
        if self.stream.max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "stream.max_attempts must be positive".to_string(),
            ));
        }

        let mut keys = HashSet::new();
        for channel in &self.channels {
            if channel.symbol.trim().is_empty() {
                return Err(ConfigError::InvalidValue(
                    "channel symbol cannot be empty".to_string(),
                ));
            }
            let key = channel.channel_key();
            if !keys.insert(key.clone()) {
                return Err(ConfigError::InvalidValue(format!(
                    "duplicate channel key {}",
                    key
                )));
            }
        }

        Ok(())
    }
}

fn http_to_ws(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        url.to_string()
    }
}
