//! In-memory port fakes shared by the unit tests of this crate.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use brewlink_domain::alert::{AlertEvent, AlertKind, AlertRecord};
use brewlink_domain::brew::BrewType;
use brewlink_domain::error::BrewLinkError;
use brewlink_domain::id::{AlertId, DeviceId};
use brewlink_domain::reading::TelemetryReading;
use brewlink_domain::time::Timestamp;

use crate::ports::{
    InboundMessage, PersistenceGateway, TelemetryPublisher, Transport, TransportError,
    TransportEvent,
};

#[derive(Default)]
pub struct InMemoryGateway {
    readings: Mutex<Vec<TelemetryReading>>,
    usage: Mutex<Vec<(DeviceId, BrewType, Timestamp)>>,
    alerts: Mutex<Vec<AlertRecord>>,
    failing_appends: AtomicU32,
}

impl InMemoryGateway {
    pub fn fail_next_appends(&self, n: u32) {
        self.failing_appends.store(n, Ordering::SeqCst);
    }

    pub fn readings(&self) -> Vec<TelemetryReading> {
        self.readings.lock().unwrap().clone()
    }

    pub fn usage(&self) -> Vec<(DeviceId, BrewType, Timestamp)> {
        self.usage.lock().unwrap().clone()
    }

    pub fn alerts(&self) -> Vec<AlertEvent> {
        self.alerts
            .lock()
            .unwrap()
            .iter()
            .map(|record| record.alert.clone())
            .collect()
    }
}

impl PersistenceGateway for InMemoryGateway {
    fn save_reading(
        &self,
        reading: TelemetryReading,
    ) -> impl Future<Output = Result<(), BrewLinkError>> + Send {
        self.readings.lock().unwrap().push(reading);
        async { Ok(()) }
    }

    fn append_usage(
        &self,
        device_id: DeviceId,
        brew_type: BrewType,
        at: Timestamp,
    ) -> impl Future<Output = Result<(), BrewLinkError>> + Send {
        self.usage.lock().unwrap().push((device_id, brew_type, at));
        async { Ok(()) }
    }

    fn append_alert(
        &self,
        alert: AlertEvent,
    ) -> impl Future<Output = Result<AlertId, BrewLinkError>> + Send {
        let failing = self
            .failing_appends
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        let result = if failing {
            Err(BrewLinkError::Persistence("store unavailable".into()))
        } else {
            let id = AlertId::new();
            self.alerts.lock().unwrap().push(AlertRecord {
                id,
                alert,
                resolved: false,
            });
            Ok(id)
        };
        async { result }
    }

    fn find_recent_alert(
        &self,
        device_id: DeviceId,
        kind: AlertKind,
        since: Timestamp,
    ) -> impl Future<Output = Result<Option<AlertId>, BrewLinkError>> + Send {
        let found = self
            .alerts
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|r| {
                !r.resolved
                    && r.alert.device_id == device_id
                    && r.alert.kind == kind
                    && r.alert.timestamp >= since
            })
            .map(|r| r.id);
        async move { Ok(found) }
    }

    fn alerts_for_device(
        &self,
        device_id: DeviceId,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<AlertRecord>, BrewLinkError>> + Send {
        let found: Vec<_> = self
            .alerts
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|r| r.alert.device_id == device_id)
            .take(limit)
            .cloned()
            .collect();
        async move { Ok(found) }
    }

    fn resolve_alert(
        &self,
        id: AlertId,
    ) -> impl Future<Output = Result<Option<AlertRecord>, BrewLinkError>> + Send {
        let resolved = self
            .alerts
            .lock()
            .unwrap()
            .iter_mut()
            .find(|r| r.id == id && !r.resolved)
            .map(|r| {
                r.resolved = true;
                r.clone()
            });
        async move { Ok(resolved) }
    }
}

#[derive(Default)]
struct FakeState {
    connected: bool,
    events: Option<mpsc::Sender<TransportEvent>>,
    subscriptions: Vec<String>,
    subscribe_calls: u32,
    connect_attempts: Vec<tokio::time::Instant>,
    failures_left: u32,
    config_error: bool,
    /// Messages published while disconnected, held like a persistent session.
    held: VecDeque<InboundMessage>,
    published: Vec<InboundMessage>,
}

/// Broker-less transport: publishing loops straight back to the subscriber.
#[derive(Clone, Default)]
pub struct FakeTransport {
    state: Arc<Mutex<FakeState>>,
}

impl FakeTransport {
    pub fn failing_connects(n: u32) -> Self {
        let transport = Self::default();
        transport.state.lock().unwrap().failures_left = n;
        transport
    }

    pub fn misconfigured() -> Self {
        let transport = Self::default();
        transport.state.lock().unwrap().config_error = true;
        transport
    }

    pub fn set_failures(&self, n: u32) {
        self.state.lock().unwrap().failures_left = n;
    }

    pub fn connect_attempts(&self) -> Vec<tokio::time::Instant> {
        self.state.lock().unwrap().connect_attempts.clone()
    }

    pub fn subscribe_calls(&self) -> u32 {
        self.state.lock().unwrap().subscribe_calls
    }

    pub fn is_subscribed(&self) -> bool {
        !self.state.lock().unwrap().subscriptions.is_empty()
    }

    pub fn published(&self) -> Vec<InboundMessage> {
        self.state.lock().unwrap().published.clone()
    }

    /// Simulate the broker dropping the connection.
    pub async fn drop_connection(&self) {
        let events = {
            let mut state = self.state.lock().unwrap();
            state.connected = false;
            state.events.take()
        };
        if let Some(events) = events {
            let _ = events
                .send(TransportEvent::Disconnected {
                    reason: "connection reset".into(),
                })
                .await;
        }
    }

    /// Simulate the client reconnecting on its own.
    pub async fn signal_reconnected(&self) {
        let events = self.state.lock().unwrap().events.clone();
        if let Some(events) = events {
            let _ = events.send(TransportEvent::Reconnected).await;
        }
    }

    /// Deliver a message as if the broker routed it to us.
    pub async fn inject(&self, topic: &str, payload: &[u8]) {
        let message = InboundMessage::new(topic, payload);
        let events = {
            let mut state = self.state.lock().unwrap();
            state.published.push(message.clone());
            if state.connected && !state.subscriptions.is_empty() {
                state.events.clone()
            } else {
                state.held.push_back(message.clone());
                None
            }
        };
        if let Some(events) = events {
            let _ = events.send(TransportEvent::Message(message)).await;
        }
    }
}

impl TelemetryPublisher for FakeTransport {
    fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        let transport = self.clone();
        let topic = topic.to_string();
        async move {
            transport.inject(&topic, &payload).await;
            Ok(())
        }
    }
}

impl Transport for FakeTransport {
    fn connect(
        &self,
        events: mpsc::Sender<TransportEvent>,
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        let result = {
            let mut state = self.state.lock().unwrap();
            state.connect_attempts.push(tokio::time::Instant::now());
            if state.config_error {
                Err(TransportError::Config("missing credentials".into()))
            } else if state.failures_left > 0 {
                state.failures_left -= 1;
                Err(TransportError::Connect("connection refused".into()))
            } else {
                state.connected = true;
                state.events = Some(events);
                Ok(())
            }
        };
        async { result }
    }

    fn subscribe(&self, filter: &str) -> impl Future<Output = Result<(), TransportError>> + Send {
        let (events, held) = {
            let mut state = self.state.lock().unwrap();
            state.subscribe_calls += 1;
            if !state.subscriptions.iter().any(|s| s == filter) {
                state.subscriptions.push(filter.to_string());
            }
            let held: Vec<_> = state.held.drain(..).collect();
            (state.events.clone(), held)
        };
        async move {
            if let Some(events) = events {
                for message in held {
                    let _ = events.send(TransportEvent::Message(message)).await;
                }
            }
            Ok(())
        }
    }

    fn unsubscribe(&self, filter: &str) -> impl Future<Output = Result<(), TransportError>> + Send {
        self.state
            .lock()
            .unwrap()
            .subscriptions
            .retain(|s| s != filter);
        async { Ok(()) }
    }

    fn disconnect(&self) -> impl Future<Output = Result<(), TransportError>> + Send {
        let mut state = self.state.lock().unwrap();
        state.connected = false;
        state.events = None;
        async { Ok(()) }
    }
}

/// Poll `check` until it holds, advancing (possibly paused) time in small steps.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..1_000 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
