//! MQTT adapter error types.

use brewlink_app::ports::TransportError;

/// Errors specific to the MQTT adapter.
#[derive(Debug, thiserror::Error)]
pub enum MqttError {
    #[error("invalid MQTT configuration: {0}")]
    InvalidConfig(&'static str),

    #[error("MQTT credentials are required but missing")]
    MissingCredentials,

    /// The MQTT client has no live session.
    #[error("MQTT client not connected")]
    NotConnected,

    /// The broker refused the session.
    #[error("broker refused connection: {0}")]
    Refused(String),

    #[error("no CONNACK within {0:?}")]
    ConnectTimeout(std::time::Duration),

    /// The event loop failed while establishing or holding the session.
    #[error("MQTT connection error")]
    Connection(#[source] rumqttc::ConnectionError),

    /// The rumqttc client returned an error.
    #[error("MQTT client error")]
    Client(#[source] rumqttc::ClientError),
}

impl MqttError {
    /// Convert into a [`TransportError`] for propagation across the port
    /// boundary.
    #[must_use]
    pub fn into_transport(self) -> TransportError {
        match self {
            Self::InvalidConfig(_) | Self::MissingCredentials => {
                TransportError::Config(self.to_string())
            }
            Self::NotConnected => TransportError::NotConnected,
            Self::Refused(_) | Self::ConnectTimeout(_) | Self::Connection(_) => {
                TransportError::Connect(Box::new(self))
            }
            Self::Client(_) => TransportError::Request(Box::new(self)),
        }
    }
}

impl From<MqttError> for TransportError {
    fn from(err: MqttError) -> Self {
        err.into_transport()
    }
}
