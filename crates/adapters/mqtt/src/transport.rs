//! [`Transport`] implementation over `rumqttc`.

use std::future::Future;
use std::sync::{Mutex, PoisonError};

use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use brewlink_app::ports::{
    InboundMessage, TelemetryPublisher, Transport, TransportError, TransportEvent,
};

use crate::config::MqttConfig;
use crate::error::MqttError;

struct Session {
    client: AsyncClient,
    poller: JoinHandle<()>,
}

/// MQTT client holding at most one live session.
pub struct MqttTransport {
    config: MqttConfig,
    session: Mutex<Option<Session>>,
}

impl MqttTransport {
    /// Create a transport after validating `config`.
    ///
    /// # Errors
    ///
    /// Returns the validation error; a misconfigured transport never
    /// attempts to connect.
    pub fn new(config: MqttConfig) -> Result<Self, MqttError> {
        config.validate()?;
        Ok(Self {
            config,
            session: Mutex::new(None),
        })
    }

    fn options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(
            &self.config.client_id,
            &self.config.broker_host,
            self.config.broker_port,
        );
        options
            .set_keep_alive(self.config.keep_alive())
            .set_clean_session(false);
        if let (Some(username), Some(password)) = (&self.config.username, &self.config.password) {
            options.set_credentials(username, password);
        }
        options
    }

    fn client(&self) -> Result<AsyncClient, MqttError> {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|session| session.client.clone())
            .ok_or(MqttError::NotConnected)
    }

    async fn open(&self, events: mpsc::Sender<TransportEvent>) -> Result<(), MqttError> {
        self.config.validate()?;
        let (client, mut eventloop) = AsyncClient::new(self.options(), self.config.request_capacity);

        let timeout = self.config.connect_timeout();
        tokio::time::timeout(timeout, wait_for_connack(&mut eventloop))
            .await
            .map_err(|_| MqttError::ConnectTimeout(timeout))??;

        tracing::info!(
            host = %self.config.broker_host,
            port = self.config.broker_port,
            client_id = %self.config.client_id,
            "MQTT session established"
        );
        let poller = tokio::spawn(poll_loop(eventloop, events));

        let previous = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(Session { client, poller });
        if let Some(previous) = previous {
            previous.poller.abort();
        }
        Ok(())
    }
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<(), MqttError> {
    loop {
        match eventloop.poll().await.map_err(MqttError::Connection)? {
            Event::Incoming(Packet::ConnAck(ack)) if ack.code == ConnectReturnCode::Success => {
                return Ok(());
            }
            Event::Incoming(Packet::ConnAck(ack)) => {
                return Err(MqttError::Refused(format!("{:?}", ack.code)));
            }
            _ => {}
        }
    }
}

/// Drive the event loop, forwarding publishes until the connection drops.
async fn poll_loop(mut eventloop: EventLoop, events: mpsc::Sender<TransportEvent>) {
    loop {
        let event = match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => TransportEvent::Message(
                InboundMessage::new(publish.topic, publish.payload.to_vec()),
            ),
            Ok(Event::Incoming(Packet::ConnAck(_))) => TransportEvent::Reconnected,
            Ok(_) => continue,
            Err(err) => {
                tracing::warn!(error = %err, "MQTT event loop stopped");
                let _ = events
                    .send(TransportEvent::Disconnected {
                        reason: err.to_string(),
                    })
                    .await;
                return;
            }
        };
        if events.send(event).await.is_err() {
            tracing::debug!("event receiver dropped, stopping MQTT event loop");
            return;
        }
    }
}

impl TelemetryPublisher for MqttTransport {
    fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        let client = self.client();
        let topic = topic.to_string();
        async move {
            client?
                .publish(topic, QoS::AtLeastOnce, false, payload)
                .await
                .map_err(MqttError::Client)?;
            Ok::<(), TransportError>(())
        }
    }
}

impl Transport for MqttTransport {
    fn connect(
        &self,
        events: mpsc::Sender<TransportEvent>,
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        async move { self.open(events).await.map_err(MqttError::into_transport) }
    }

    fn subscribe(&self, filter: &str) -> impl Future<Output = Result<(), TransportError>> + Send {
        let client = self.client();
        let filter = filter.to_string();
        async move {
            client?
                .subscribe(filter.as_str(), QoS::AtLeastOnce)
                .await
                .map_err(MqttError::Client)?;
            tracing::info!(%filter, "subscribed");
            Ok::<(), TransportError>(())
        }
    }

    fn unsubscribe(&self, filter: &str) -> impl Future<Output = Result<(), TransportError>> + Send {
        let client = self.client();
        let filter = filter.to_string();
        async move {
            client?.unsubscribe(filter).await.map_err(MqttError::Client)?;
            Ok::<(), TransportError>(())
        }
    }

    fn disconnect(&self) -> impl Future<Output = Result<(), TransportError>> + Send {
        let session = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        async move {
            let Some(session) = session else {
                return Ok(());
            };
            let result = session.client.disconnect().await;
            session.poller.abort();
            result.map_err(|err| MqttError::Client(err).into_transport())
        }
    }
}
