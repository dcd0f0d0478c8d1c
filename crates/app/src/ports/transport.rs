//! Transport port: the publish/subscribe client the pipeline consumes.
//!
//! The transport owns the wire protocol. It reports what happens on the
//! connection as [`TransportEvent`]s pushed into a channel handed over at
//! [`Transport::connect`]; the connection supervisor decides what to do
//! with them.

use std::future::Future;

use tokio::sync::mpsc;

/// A raw message received on a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl InboundMessage {
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// What a live connection reports back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Message(InboundMessage),
    /// The transport re-established its session on its own; subscriptions
    /// may need to be renewed.
    Reconnected,
    /// The connection is gone and will not come back without a new
    /// [`Transport::connect`].
    Disconnected { reason: String },
}

/// Errors raised by transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The client is misconfigured; retrying cannot help.
    #[error("invalid transport configuration: {0}")]
    Config(String),

    #[error("connection failed")]
    Connect(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("transport is not connected")]
    NotConnected,

    #[error("transport request failed")]
    Request(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl TransportError {
    /// Whether a later attempt may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Config(_))
    }
}

/// Publishing half of a transport.
pub trait TelemetryPublisher: Send + Sync + 'static {
    /// Publish `payload` on `topic` with at-least-once delivery.
    fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// A full publish/subscribe client.
pub trait Transport: TelemetryPublisher {
    /// Open a session and start forwarding events into `events`.
    ///
    /// Resolves once the broker acknowledged the session.
    fn connect(
        &self,
        events: mpsc::Sender<TransportEvent>,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Subscribe to a topic filter (wildcards allowed).
    fn subscribe(&self, filter: &str) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn unsubscribe(&self, filter: &str)
    -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Close the session. Idempotent.
    fn disconnect(&self) -> impl Future<Output = Result<(), TransportError>> + Send;
}
