//! MQTT transport configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::error::MqttError;

/// Configuration for the MQTT transport.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// MQTT broker hostname or IP address.
    pub broker_host: String,
    /// MQTT broker port.
    pub broker_port: u16,
    /// Stable client identifier; the broker keys the persistent session on it.
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Refuse to connect without credentials.
    pub require_auth: bool,
    /// First topic level of every telemetry topic.
    pub namespace: String,
    /// Keep-alive interval in seconds.
    pub keep_alive_secs: u64,
    /// How long to wait for the broker's CONNACK, in seconds.
    pub connect_timeout_secs: u64,
    /// Retries after a failed connection attempt.
    pub max_retries: u32,
    /// Delay before the first retry, in seconds; doubled on every retry.
    pub backoff_base_secs: u64,
    /// Capacity of the client's request queue.
    pub request_capacity: usize,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker_host: "localhost".to_string(),
            broker_port: 1883,
            client_id: "brewlink-ingest".to_string(),
            username: None,
            password: None,
            require_auth: true,
            namespace: "coffeemachine".to_string(),
            keep_alive_secs: 30,
            connect_timeout_secs: 10,
            max_retries: 5,
            backoff_base_secs: 2,
            request_capacity: 64,
        }
    }
}

impl MqttConfig {
    #[must_use]
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    #[must_use]
    pub fn backoff_base(&self) -> Duration {
        Duration::from_secs(self.backoff_base_secs)
    }

    /// Check the settings that no amount of retrying can fix.
    ///
    /// # Errors
    ///
    /// Returns [`MqttError::MissingCredentials`] when authentication is
    /// required but a username or password is missing, and
    /// [`MqttError::InvalidConfig`] for an empty host, client id or namespace.
    pub fn validate(&self) -> Result<(), MqttError> {
        if self.broker_host.trim().is_empty() {
            return Err(MqttError::InvalidConfig("broker_host must not be empty"));
        }
        if self.client_id.trim().is_empty() {
            return Err(MqttError::InvalidConfig("client_id must not be empty"));
        }
        if self.namespace.trim().is_empty() || self.namespace.contains(['+', '#', '/']) {
            return Err(MqttError::InvalidConfig(
                "namespace must be a single non-wildcard topic level",
            ));
        }
        if self.keep_alive_secs == 0 {
            return Err(MqttError::InvalidConfig("keep_alive_secs must be at least 1"));
        }
        let blank = |value: &Option<String>| value.as_deref().is_none_or(str::is_empty);
        if self.require_auth && (blank(&self.username) || blank(&self.password)) {
            return Err(MqttError::MissingCredentials);
        }
        Ok(())
    }
}
