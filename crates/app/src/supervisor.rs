//! Connection supervisor: owns the connect / retry / resubscribe lifecycle.
//!
//! The supervisor runs as one background task. It connects with bounded
//! exponential backoff, subscribes to the telemetry filter, and then pumps
//! transport events into the [`IngestionDispatcher`]. A transport-reported
//! disconnect sends it back through the same backoff schedule; a
//! transport-reported reconnect triggers a resubscribe. Its current
//! [`ConnectionState`] is published on a watch channel.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::dispatcher::IngestionDispatcher;
use crate::ports::{Transport, TransportError, TransportEvent};

const EVENT_BUFFER: usize = 1024;

/// Retry policy and topic of the supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorSettings {
    /// Topic filter to subscribe to after every (re)connect.
    pub filter: String,
    /// Retries after the first failed attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for every further retry.
    pub backoff_base: Duration,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            filter: crate::codec::subscription_filter(crate::codec::DEFAULT_NAMESPACE),
            max_retries: 5,
            backoff_base: Duration::from_secs(2),
        }
    }
}

impl SupervisorSettings {
    /// Delay before retry number `retry` (1-based).
    #[must_use]
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2_u32.checked_pow(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.backoff_base.saturating_mul(factor)
    }
}

/// Lifecycle of the transport connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    /// Connectivity is lost for good; an operator has to step in.
    Failed(String),
    Stopped,
}

/// Why the supervisor gave up.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("transport misconfigured")]
    Config(#[source] TransportError),

    #[error("gave up after {attempts} connection attempts")]
    Exhausted {
        attempts: u32,
        #[source]
        last: TransportError,
    },

    #[error("stopped while connecting")]
    Cancelled,
}

/// Handle to the running supervisor task.
pub struct ConnectionSupervisor<T> {
    transport: Arc<T>,
    filter: String,
    cancel: CancellationToken,
    state: watch::Receiver<ConnectionState>,
    task: JoinHandle<IngestionDispatcher>,
}

struct Worker<T> {
    transport: Arc<T>,
    settings: SupervisorSettings,
    dispatcher: IngestionDispatcher,
    state: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
    events_tx: mpsc::Sender<TransportEvent>,
    events_rx: mpsc::Receiver<TransportEvent>,
}

impl<T: Transport> ConnectionSupervisor<T> {
    /// Spawn the supervisor task and return immediately.
    pub fn start(
        transport: Arc<T>,
        dispatcher: IngestionDispatcher,
        settings: SupervisorSettings,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let cancel = CancellationToken::new();
        let filter = settings.filter.clone();

        let worker = Worker {
            transport: Arc::clone(&transport),
            settings,
            dispatcher,
            state: state_tx,
            cancel: cancel.clone(),
            events_tx,
            events_rx,
        };
        let task = tokio::spawn(worker.run());

        Self {
            transport,
            filter,
            cancel,
            state: state_rx,
            task,
        }
    }

    /// Watch the connection state.
    #[must_use]
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Cancel retries, close the session and drain accepted work.
    ///
    /// Returns `true` when the dispatcher drained in time.
    pub async fn stop(self) -> bool {
        self.cancel.cancel();

        if let Err(err) = self.transport.unsubscribe(&self.filter).await {
            tracing::debug!(error = %err, "unsubscribe on stop failed");
        }
        if let Err(err) = self.transport.disconnect().await {
            tracing::warn!(error = %err, "disconnect on stop failed");
        }

        match self.task.await {
            Ok(dispatcher) => dispatcher.shutdown().await,
            Err(err) => {
                tracing::error!(error = %err, "connection supervisor task panicked");
                false
            }
        }
    }
}

async fn attempt<T: Transport>(
    transport: &T,
    events: &mpsc::Sender<TransportEvent>,
    filter: &str,
) -> Result<(), TransportError> {
    transport.connect(events.clone()).await?;
    transport.subscribe(filter).await
}

impl<T: Transport> Worker<T> {
    async fn run(mut self) -> IngestionDispatcher {
        let mut phase = ConnectionState::Connecting;
        loop {
            self.state.send_replace(phase);
            match self.establish().await {
                Ok(()) => {
                    tracing::info!(filter = %self.settings.filter, "transport connected and subscribed");
                    self.state.send_replace(ConnectionState::Connected);
                }
                Err(SupervisorError::Cancelled) => break,
                Err(err) => {
                    tracing::error!(error = %err, "telemetry ingestion stopped: connectivity lost");
                    self.state.send_replace(ConnectionState::Failed(err.to_string()));
                    self.cancel.cancelled().await;
                    break;
                }
            }

            if !self.pump().await {
                break;
            }
            phase = ConnectionState::Reconnecting;
        }

        self.drain_buffered().await;
        self.state.send_replace(ConnectionState::Stopped);
        self.dispatcher
    }

    /// Connect and subscribe, retrying with backoff.
    async fn establish(&mut self) -> Result<(), SupervisorError> {
        let transport = &*self.transport;
        let settings = &self.settings;
        let events = &self.events_tx;
        let cancel = &self.cancel;

        let mut retry = 0;
        loop {
            let outcome = tokio::select! {
                () = cancel.cancelled() => return Err(SupervisorError::Cancelled),
                result = attempt(transport, events, &settings.filter) => result,
            };
            let err = match outcome {
                Ok(()) => return Ok(()),
                Err(err) if !err.is_retryable() => return Err(SupervisorError::Config(err)),
                Err(err) => err,
            };

            if retry >= settings.max_retries {
                return Err(SupervisorError::Exhausted {
                    attempts: retry + 1,
                    last: err,
                });
            }
            retry += 1;
            let delay = settings.backoff(retry);
            tracing::warn!(error = %err, retry, ?delay, "connection attempt failed, backing off");
            tokio::select! {
                () = cancel.cancelled() => return Err(SupervisorError::Cancelled),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Forward events until the connection drops (`true`) or the supervisor
    /// is stopped (`false`).
    async fn pump(&mut self) -> bool {
        loop {
            let event = tokio::select! {
                () = self.cancel.cancelled() => return false,
                event = self.events_rx.recv() => event,
            };
            match event {
                Some(TransportEvent::Message(message)) => self.dispatcher.submit(message).await,
                Some(TransportEvent::Reconnected) => {
                    tracing::info!("transport reconnected, renewing subscription");
                    if let Err(err) = self.transport.subscribe(&self.settings.filter).await {
                        tracing::warn!(error = %err, "resubscribe failed");
                        return true;
                    }
                }
                Some(TransportEvent::Disconnected { reason }) => {
                    tracing::warn!(%reason, "transport disconnected");
                    return true;
                }
                // unreachable while we hold `events_tx`
                None => return false,
            }
        }
    }

    /// Hand messages that were already delivered to the dispatcher.
    async fn drain_buffered(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            if let TransportEvent::Message(message) = event {
                self.dispatcher.submit(message).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::{DispatcherSettings, ReadingHandler};
    use crate::metrics::PipelineMetrics;
    use crate::services::{AlertEmitter, AlertSettings, DeviceStateStore};
    use crate::testing::{FakeTransport, InMemoryGateway, eventually};
    use brewlink_domain::id::DeviceId;

    struct Fixture {
        transport: Arc<FakeTransport>,
        supervisor: ConnectionSupervisor<FakeTransport>,
        store: Arc<DeviceStateStore>,
        metrics: Arc<PipelineMetrics>,
    }

    fn start(transport: FakeTransport) -> Fixture {
        let gateway = Arc::new(InMemoryGateway::default());
        let metrics = Arc::new(PipelineMetrics::default());
        let store = Arc::new(DeviceStateStore::default());
        let emitter = Arc::new(AlertEmitter::new(
            Arc::clone(&gateway),
            AlertSettings::default(),
            Arc::clone(&metrics),
        ));
        let handler = ReadingHandler::new(
            Arc::clone(&store),
            emitter,
            gateway,
            Arc::clone(&metrics),
            Duration::from_secs(1),
        );
        let dispatcher = IngestionDispatcher::start(
            handler,
            DispatcherSettings {
                workers: 4,
                ..DispatcherSettings::default()
            },
        );
        let transport = Arc::new(transport);
        let supervisor = ConnectionSupervisor::start(
            Arc::clone(&transport),
            dispatcher,
            SupervisorSettings::default(),
        );
        Fixture {
            transport,
            supervisor,
            store,
            metrics,
        }
    }

    async fn wait_for(rx: &mut watch::Receiver<ConnectionState>, wanted: fn(&ConnectionState) -> bool) {
        rx.wait_for(wanted).await.unwrap();
    }

    fn gaps(attempts: &[tokio::time::Instant]) -> Vec<u64> {
        attempts
            .windows(2)
            .map(|pair| (pair[1] - pair[0]).as_secs())
            .collect()
    }

    #[test]
    fn should_double_backoff_from_base() {
        let settings = SupervisorSettings::default();
        let delays: Vec<u64> = (1..=5).map(|n| settings.backoff(n).as_secs()).collect();
        assert_eq!(delays, vec![2, 4, 8, 16, 32]);
    }

    #[tokio::test(start_paused = true)]
    async fn should_connect_and_subscribe_on_start() {
        let f = start(FakeTransport::default());
        let mut state = f.supervisor.state();
        wait_for(&mut state, |s| *s == ConnectionState::Connected).await;

        assert!(f.transport.is_subscribed());
        f.transport
            .inject("coffeemachine/4/data", br#"{"waterLevel": 55}"#)
            .await;
        assert!(f.supervisor.stop().await);

        let device = f.store.snapshot(DeviceId::new(4)).await.unwrap();
        assert_eq!(device.levels.water, Some(55.0));
    }

    #[tokio::test(start_paused = true)]
    async fn should_retry_with_exponential_backoff_until_connected() {
        let f = start(FakeTransport::failing_connects(5));
        let mut state = f.supervisor.state();
        wait_for(&mut state, |s| *s == ConnectionState::Connected).await;

        assert_eq!(gaps(&f.transport.connect_attempts()), vec![2, 4, 8, 16, 32]);
        f.supervisor.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn should_fail_after_exhausting_retries() {
        let f = start(FakeTransport::failing_connects(6));
        let mut state = f.supervisor.state();
        wait_for(&mut state, |s| matches!(s, ConnectionState::Failed(_))).await;

        assert_eq!(f.transport.connect_attempts().len(), 6);
        assert!(f.supervisor.stop().await);
    }

    #[tokio::test(start_paused = true)]
    async fn should_fail_immediately_on_config_error() {
        let f = start(FakeTransport::misconfigured());
        let mut state = f.supervisor.state();
        wait_for(&mut state, |s| matches!(s, ConnectionState::Failed(_))).await;

        assert_eq!(f.transport.connect_attempts().len(), 1);
        f.supervisor.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn should_resubscribe_when_transport_reconnects_on_its_own() {
        let f = start(FakeTransport::default());
        let mut state = f.supervisor.state();
        wait_for(&mut state, |s| *s == ConnectionState::Connected).await;
        assert_eq!(f.transport.subscribe_calls(), 1);

        f.transport.signal_reconnected().await;

        let transport = Arc::clone(&f.transport);
        eventually(|| transport.subscribe_calls() == 2).await;
        f.supervisor.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn should_reconnect_with_backoff_and_keep_readings_published_meanwhile() {
        let f = start(FakeTransport::default());
        let mut state = f.supervisor.state();
        wait_for(&mut state, |s| *s == ConnectionState::Connected).await;

        f.transport.set_failures(5);
        f.transport.drop_connection().await;
        wait_for(&mut state, |s| *s == ConnectionState::Reconnecting).await;

        for level in [90, 80, 70] {
            f.transport
                .inject("coffeemachine/1/data", format!(r#"{{"waterLevel": {level}}}"#).as_bytes())
                .await;
        }

        wait_for(&mut state, |s| *s == ConnectionState::Connected).await;
        let attempts = f.transport.connect_attempts();
        assert_eq!(gaps(&attempts[1..]), vec![2, 4, 8, 16, 32]);
        assert_eq!(f.transport.subscribe_calls(), 2);

        let metrics = Arc::clone(&f.metrics);
        eventually(|| metrics.snapshot().readings_applied == 3).await;
        assert!(f.supervisor.stop().await);
        let device = f.store.snapshot(DeviceId::new(1)).await.unwrap();
        assert_eq!(device.levels.water, Some(70.0));
    }

    #[tokio::test(start_paused = true)]
    async fn should_abandon_retries_when_stopped() {
        let f = start(FakeTransport::failing_connects(100));
        let transport = Arc::clone(&f.transport);
        eventually(|| transport.connect_attempts().len() >= 2).await;

        assert!(f.supervisor.stop().await);
        let attempts = f.transport.connect_attempts().len();
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(f.transport.connect_attempts().len(), attempts);
    }

    #[tokio::test(start_paused = true)]
    async fn should_report_stopped_after_stop() {
        let f = start(FakeTransport::default());
        let mut state = f.supervisor.state();
        wait_for(&mut state, |s| *s == ConnectionState::Connected).await;

        f.supervisor.stop().await;

        assert_eq!(*state.borrow(), ConnectionState::Stopped);
    }
}
