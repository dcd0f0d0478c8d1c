//! Configuration loading: TOML file with environment variable overrides.
//!
//! Looks for `brewlink.toml` in the working directory. Every field has a
//! sensible default so the file is optional. Environment variables take
//! precedence over file values.

use std::time::Duration;

use serde::Deserialize;

use brewlink_adapter_mqtt::{MqttConfig, MqttError};
use brewlink_adapter_simulator::SimulatorConfig;
use brewlink_app::dispatcher::DispatcherSettings;
use brewlink_app::services::AlertSettings;
use brewlink_app::supervisor::SupervisorSettings;
use brewlink_domain::device::Thresholds;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server settings.
    pub server: ServerConfig,
    /// Database settings.
    pub database: DatabaseConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Broker connection and retry policy.
    pub mqtt: MqttConfig,
    /// Ingestion worker pool.
    pub pipeline: PipelineConfig,
    /// Alerting thresholds.
    pub thresholds: Thresholds,
    /// Alert deduplication.
    pub alerts: AlertsConfig,
    /// Synthetic load.
    pub simulator: SimulatorConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to (e.g. `0.0.0.0`).
    pub host: String,
    /// TCP port.
    pub port: u16,
}

/// `SQLite` database configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `SQLite` connection URL or file path.
    pub url: String,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub workers: usize,
    pub queue_depth: usize,
    pub drain_timeout_secs: u64,
    /// Upper bound on every persistence call.
    pub persistence_timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    pub cooldown_secs: u64,
    pub dedupe_capacity: usize,
}

impl Config {
    /// Load configuration from `brewlink.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if the
    /// resulting configuration is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file("brewlink.toml")?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(val) = var("BREWLINK_HOST") {
            self.server.host = val;
        }
        if let Some(port) = var("BREWLINK_PORT").and_then(|val| val.parse().ok()) {
            self.server.port = port;
        }
        if let Some(val) = var("BREWLINK_BIND") {
            if let Some((host, port)) = val.rsplit_once(':') {
                self.server.host = host.to_string();
                if let Ok(port) = port.parse() {
                    self.server.port = port;
                }
            }
        }
        if let Some(val) = var("BREWLINK_DATABASE_URL") {
            self.database.url = val;
        }
        if let Some(val) = var("BREWLINK_LOG") {
            self.logging.filter = val;
        }
        if let Some(val) = var("RUST_LOG") {
            self.logging.filter = val;
        }
        if let Some(val) = var("BREWLINK_MQTT_HOST") {
            self.mqtt.broker_host = val;
        }
        if let Some(port) = var("BREWLINK_MQTT_PORT").and_then(|val| val.parse().ok()) {
            self.mqtt.broker_port = port;
        }
        if let Some(val) = var("BREWLINK_MQTT_USERNAME") {
            self.mqtt.username = Some(val);
        }
        if let Some(val) = var("BREWLINK_MQTT_PASSWORD") {
            self.mqtt.password = Some(val);
        }
        if let Some(enabled) = var("BREWLINK_SIMULATOR").and_then(|val| val.parse().ok()) {
            self.simulator.enabled = enabled;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation("port must be non-zero".to_string()));
        }
        if self.pipeline.workers == 0 || self.pipeline.queue_depth == 0 {
            return Err(ConfigError::Validation(
                "pipeline workers and queue depth must be non-zero".to_string(),
            ));
        }
        if self.pipeline.persistence_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "persistence timeout must be non-zero".to_string(),
            ));
        }
        if self.thresholds.critical_supply > self.thresholds.low_supply {
            return Err(ConfigError::Validation(
                "critical supply threshold must not exceed the low supply threshold".to_string(),
            ));
        }
        self.mqtt.validate()?;
        Ok(())
    }

    /// Return the `host:port` bind address.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    #[must_use]
    pub fn persistence_timeout(&self) -> Duration {
        Duration::from_secs(self.pipeline.persistence_timeout_secs)
    }

    #[must_use]
    pub fn dispatcher_settings(&self) -> DispatcherSettings {
        DispatcherSettings {
            workers: self.pipeline.workers,
            queue_depth: self.pipeline.queue_depth,
            drain_timeout: Duration::from_secs(self.pipeline.drain_timeout_secs),
        }
    }

    #[must_use]
    pub fn alert_settings(&self) -> AlertSettings {
        AlertSettings {
            cooldown: Duration::from_secs(self.alerts.cooldown_secs),
            dedupe_capacity: self.alerts.dedupe_capacity,
            persistence_timeout: self.persistence_timeout(),
        }
    }

    #[must_use]
    pub fn supervisor_settings(&self) -> SupervisorSettings {
        SupervisorSettings {
            filter: brewlink_app::codec::subscription_filter(&self.mqtt.namespace),
            max_retries: self.mqtt.max_retries,
            backoff_base: self.mqtt.backoff_base(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:brewlink.db?mode=rwc".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "brewlinkd=info,brewlink=info,tower_http=debug".to_string(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let defaults = DispatcherSettings::default();
        Self {
            workers: defaults.workers,
            queue_depth: defaults.queue_depth,
            drain_timeout_secs: defaults.drain_timeout.as_secs(),
            persistence_timeout_secs: AlertSettings::default().persistence_timeout.as_secs(),
        }
    }
}

impl Default for AlertsConfig {
    fn default() -> Self {
        let defaults = AlertSettings::default();
        Self {
            cooldown_secs: defaults.cooldown.as_secs(),
            dedupe_capacity: defaults.dedupe_capacity,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
    /// Broker settings that retrying cannot fix.
    #[error("invalid mqtt configuration")]
    Mqtt(#[from] MqttError),
}
