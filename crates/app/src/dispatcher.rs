//! Ingestion dispatcher: decode inbound messages and fan them out to a
//! bounded worker pool.
//!
//! Readings are sharded by device id, one bounded queue per worker, so every
//! device is always served by the same worker and its readings are applied
//! in arrival order. [`IngestionDispatcher::submit`] waits when the target
//! queue is full instead of dropping the reading.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use brewlink_domain::id::DeviceId;
use brewlink_domain::reading::TelemetryReading;
use brewlink_domain::time::now;

use crate::codec;
use crate::metrics::PipelineMetrics;
use crate::ports::{InboundMessage, PersistenceGateway};
use crate::retry::retry_once;
use crate::services::{AlertEmitter, DeviceStateStore};

/// Sizing of the worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherSettings {
    pub workers: usize,
    /// Capacity of each worker's queue.
    pub queue_depth: usize,
    /// How long [`IngestionDispatcher::shutdown`] waits for queued work.
    pub drain_timeout: Duration,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            workers: 50,
            queue_depth: 64,
            drain_timeout: Duration::from_secs(10),
        }
    }
}

/// Processes one decoded reading end to end.
pub struct ReadingHandler<G> {
    store: Arc<DeviceStateStore>,
    emitter: Arc<AlertEmitter<G>>,
    gateway: Arc<G>,
    metrics: Arc<PipelineMetrics>,
    persistence_timeout: Duration,
}

impl<G: PersistenceGateway> ReadingHandler<G> {
    pub fn new(
        store: Arc<DeviceStateStore>,
        emitter: Arc<AlertEmitter<G>>,
        gateway: Arc<G>,
        metrics: Arc<PipelineMetrics>,
        persistence_timeout: Duration,
    ) -> Self {
        Self {
            store,
            emitter,
            gateway,
            metrics,
            persistence_timeout,
        }
    }

    /// Reconcile, log the reading, then raise alerts for its crossings.
    ///
    /// The reading keeps the device's own timestamp in the log; its alerts
    /// are stamped on receipt.
    #[tracing::instrument(skip(self, reading), fields(device_id = %reading.device_id))]
    pub async fn handle(&self, reading: TelemetryReading) {
        let reconciliation = self.store.reconcile(&reading).await;
        self.metrics
            .add_clamped_fields(reconciliation.clamped.len() as u64);
        self.metrics
            .add_rejected_fields(reconciliation.rejected.len() as u64);

        let device_id = reading.device_id;
        if let Err(err) = retry_once("save_reading", self.persistence_timeout, || {
            self.gateway.save_reading(reading.clone())
        })
        .await
        {
            tracing::error!(error = %err, "failed to save reading");
            self.metrics.add_persistence_failures(1);
        }

        self.emitter
            .emit_all(device_id, &reconciliation.crossings)
            .await;
        self.metrics.add_readings_applied(1);
    }
}

/// Bounded, device-keyed worker pool.
pub struct IngestionDispatcher {
    queues: Vec<mpsc::Sender<TelemetryReading>>,
    workers: Vec<JoinHandle<()>>,
    metrics: Arc<PipelineMetrics>,
    drain_timeout: Duration,
}

impl IngestionDispatcher {
    /// Spawn the workers. Must be called inside a tokio runtime.
    pub fn start<G: PersistenceGateway>(
        handler: ReadingHandler<G>,
        settings: DispatcherSettings,
    ) -> Self {
        let metrics = Arc::clone(&handler.metrics);
        let handler = Arc::new(handler);
        let count = settings.workers.max(1);
        let mut queues = Vec::with_capacity(count);
        let mut workers = Vec::with_capacity(count);
        for index in 0..count {
            let (tx, mut rx) = mpsc::channel::<TelemetryReading>(settings.queue_depth.max(1));
            let handler = Arc::clone(&handler);
            workers.push(tokio::spawn(async move {
                while let Some(reading) = rx.recv().await {
                    handler.handle(reading).await;
                }
                tracing::trace!(worker = index, "ingestion worker drained");
            }));
            queues.push(tx);
        }

        Self {
            queues,
            workers,
            metrics,
            drain_timeout: settings.drain_timeout,
        }
    }

    fn queue_for(&self, device_id: DeviceId) -> &mpsc::Sender<TelemetryReading> {
        &self.queues[device_id.get() as usize % self.queues.len()]
    }

    /// Decode and enqueue one inbound message.
    ///
    /// Malformed messages are logged, counted and dropped. Waits while the
    /// device's queue is full.
    pub async fn submit(&self, message: InboundMessage) {
        self.metrics.add_readings_received(1);
        match codec::decode(&message.topic, &message.payload, now()) {
            Ok(reading) => self.enqueue(reading).await,
            Err(err) => {
                tracing::warn!(topic = %message.topic, error = %err, "dropping malformed telemetry");
                self.metrics.add_decode_errors(1);
            }
        }
    }

    /// Enqueue an already decoded reading.
    pub async fn enqueue(&self, reading: TelemetryReading) {
        let device_id = reading.device_id;
        if self.queue_for(device_id).send(reading).await.is_err() {
            tracing::error!(%device_id, "ingestion worker is gone, reading lost");
        }
    }

    /// Stop accepting work and wait (bounded) for queued readings to finish.
    ///
    /// Returns `true` when every queue drained in time.
    pub async fn shutdown(self) -> bool {
        let Self {
            queues,
            mut workers,
            drain_timeout,
            ..
        } = self;
        drop(queues);

        let drained = tokio::time::timeout(drain_timeout, async {
            for worker in &mut workers {
                if let Err(err) = worker.await {
                    tracing::error!(error = %err, "ingestion worker panicked");
                }
            }
        })
        .await
        .is_ok();

        if !drained {
            tracing::warn!(?drain_timeout, "ingestion queues not drained in time, aborting");
            for worker in &workers {
                worker.abort();
            }
        }
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{AlertSettings, BrewProcessor};
    use crate::testing::InMemoryGateway;
    use brewlink_domain::alert::AlertKind;
    use brewlink_domain::brew::{BrewCommand, BrewType};
    use brewlink_domain::device::{DeviceStatus, Levels};
    use chrono::TimeDelta;

    struct Fixture {
        dispatcher: IngestionDispatcher,
        store: Arc<DeviceStateStore>,
        gateway: Arc<InMemoryGateway>,
        metrics: Arc<PipelineMetrics>,
    }

    fn fixture(settings: DispatcherSettings) -> Fixture {
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
            Arc::clone(&gateway),
            Arc::clone(&metrics),
            Duration::from_secs(1),
        );
        Fixture {
            dispatcher: IngestionDispatcher::start(handler, settings),
            store,
            gateway,
            metrics,
        }
    }

    fn water(device: u32, level: u32) -> InboundMessage {
        InboundMessage::new(
            format!("coffeemachine/{device}/data"),
            format!(r#"{{"machineId": {device}, "waterLevel": {level}}}"#),
        )
    }

    #[tokio::test]
    async fn should_apply_readings_in_order_per_device() {
        let f = fixture(DispatcherSettings {
            workers: 4,
            queue_depth: 2,
            ..DispatcherSettings::default()
        });

        for level in [25, 18, 15, 22, 10] {
            f.dispatcher.submit(water(1, level)).await;
        }
        for level in 0..30 {
            f.dispatcher.submit(water(2, 100 - level)).await;
        }
        assert!(f.dispatcher.shutdown().await);

        let first = f.store.snapshot(DeviceId::new(1)).await.unwrap();
        let second = f.store.snapshot(DeviceId::new(2)).await.unwrap();
        assert_eq!(first.levels.water, Some(10.0));
        assert_eq!(second.levels.water, Some(71.0));

        let low_water: Vec<_> = f
            .gateway
            .alerts()
            .into_iter()
            .filter(|a| a.device_id == DeviceId::new(1) && a.kind == AlertKind::LowWater)
            .collect();
        assert_eq!(low_water.len(), 1, "second crossing is inside the cooldown");
        assert_eq!(f.gateway.readings().len(), 35);
    }

    #[tokio::test]
    async fn should_drop_and_count_malformed_payloads() {
        let f = fixture(DispatcherSettings::default());

        f.dispatcher
            .submit(InboundMessage::new("coffeemachine/1/data", "{broken"))
            .await;
        f.dispatcher
            .submit(InboundMessage::new("not/a/telemetry/topic", "{}"))
            .await;
        f.dispatcher.submit(water(1, 50)).await;
        assert!(f.dispatcher.shutdown().await);

        let snapshot = f.metrics.snapshot();
        assert_eq!(snapshot.readings_received, 3);
        assert_eq!(snapshot.decode_errors, 2);
        assert_eq!(snapshot.readings_applied, 1);
    }

    #[tokio::test]
    async fn should_count_clamped_fields() {
        let f = fixture(DispatcherSettings::default());
        f.dispatcher.submit(water(1, 250)).await;
        assert!(f.dispatcher.shutdown().await);

        assert_eq!(f.metrics.snapshot().clamped_fields, 1);
        assert_eq!(
            f.store.snapshot(DeviceId::new(1)).await.unwrap().levels.water,
            Some(100.0)
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn should_block_instead_of_dropping_when_queues_are_full() {
        let f = fixture(DispatcherSettings {
            workers: 1,
            queue_depth: 1,
            ..DispatcherSettings::default()
        });

        for level in 0..200 {
            f.dispatcher.submit(water(level % 5, 50 + level % 50)).await;
        }
        assert!(f.dispatcher.shutdown().await);

        assert_eq!(f.metrics.snapshot().readings_applied, 200);
        assert_eq!(f.gateway.readings().len(), 200);
    }

    #[tokio::test]
    async fn should_measure_cooldown_on_server_clock_when_device_clock_lags() {
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
            Arc::clone(&emitter),
            Arc::clone(&gateway),
            Arc::clone(&metrics),
            Duration::from_secs(1),
        );
        let processor = BrewProcessor::new(
            Arc::clone(&store),
            emitter,
            Arc::clone(&gateway),
            Duration::from_secs(1),
            metrics,
        );

        let device = DeviceId::new(1);
        let lagging = now() - TimeDelta::hours(2);
        for water in [15.0, 21.0] {
            let mut reading = TelemetryReading::new(device, lagging);
            reading.status = Some(DeviceStatus::On);
            reading.levels = Levels {
                water: Some(water),
                ..Levels::uniform(100.0)
            };
            handler.handle(reading).await;
        }
        let brewed = processor
            .process(BrewCommand::new(device, BrewType::Espresso))
            .await;

        assert!(brewed.success);
        let water = store.snapshot(device).await.unwrap().levels.water.unwrap();
        assert!((water - 18.0).abs() < 1e-9);
        let low_water: Vec<_> = gateway
            .alerts()
            .into_iter()
            .filter(|a| a.kind == AlertKind::LowWater)
            .collect();
        assert_eq!(low_water.len(), 1, "brew crossing falls inside the cooldown");
        assert!(low_water[0].timestamp > lagging + TimeDelta::hours(1));
        assert!(gateway.readings().iter().all(|r| r.timestamp == lagging));
    }
}
