//! # brewlink-adapter-simulator
//!
//! Synthetic load simulator. Every interval each simulated machine is
//! switched on (85%) or off, drains or restocks its supplies, and publishes
//! a reading in the same schema the ingestion pipeline decodes.
//!
//! ## Dependency rule
//!
//! Depends on `brewlink-app` (publisher port, wire codec) and `brewlink-domain` only.

mod machine;

use std::sync::Arc;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use brewlink_app::codec;
use brewlink_app::ports::TelemetryPublisher;
use brewlink_domain::id::{DeviceId, FacilityId};
use brewlink_domain::time::now;

pub use machine::{NO_BREW, SimulatedMachine};

/// `[simulator]` section of the daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    pub device_count: u32,
    pub devices_per_facility: u32,
    /// Fixed seed for reproducible runs.
    pub seed: Option<u64>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: 30,
            device_count: 12,
            devices_per_facility: 3,
            seed: None,
        }
    }
}

impl SimulatorConfig {
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

/// Publishes one reading per simulated machine every interval.
pub struct Simulator<P> {
    publisher: Arc<P>,
    namespace: String,
    interval: Duration,
    machines: Vec<SimulatedMachine>,
    rng: StdRng,
}

impl<P: TelemetryPublisher> Simulator<P> {
    /// Build the fleet: device ids start at 1, `devices_per_facility`
    /// consecutive devices share a facility.
    pub fn new(publisher: Arc<P>, namespace: impl Into<String>, config: &SimulatorConfig) -> Self {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let per_facility = config.devices_per_facility.max(1);
        let machines = (1..=config.device_count)
            .map(|id| {
                let facility = (id - 1) / per_facility + 1;
                SimulatedMachine::new(DeviceId::new(id), FacilityId::new(facility), &mut rng)
            })
            .collect();

        Self {
            publisher,
            namespace: namespace.into(),
            interval: config.interval(),
            machines,
            rng,
        }
    }

    #[must_use]
    pub fn machines(&self) -> &[SimulatedMachine] {
        &self.machines
    }

    /// Advance every machine once and publish the readings.
    ///
    /// Returns the number of readings published; failures are logged and
    /// skipped.
    pub async fn cycle(&mut self) -> usize {
        let at = now();
        let mut outgoing = Vec::with_capacity(self.machines.len());
        for machine in &mut self.machines {
            let topic = codec::telemetry_topic(&self.namespace, machine.device_id());
            let payload = machine.tick(&mut self.rng, at);
            match codec::encode(&payload) {
                Ok(bytes) => outgoing.push((machine.device_id(), topic, bytes)),
                Err(err) => tracing::error!(device_id = %machine.device_id(), error = %err, "failed to encode reading"),
            }
        }

        let mut published = 0;
        for (device_id, topic, bytes) in outgoing {
            match self.publisher.publish(&topic, bytes).await {
                Ok(()) => published += 1,
                Err(err) => tracing::warn!(%device_id, %topic, error = %err, "failed to publish reading"),
            }
        }
        tracing::debug!(published, devices = self.machines.len(), "simulation cycle done");
        published
    }

    /// Run cycles until `cancel` fires. The first cycle runs immediately.
    pub async fn run(mut self, cancel: CancellationToken) {
        tracing::info!(
            devices = self.machines.len(),
            interval = ?self.interval,
            "simulator started"
        );
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.cycle().await;
                }
            }
        }
        tracing::info!("simulator stopped");
    }
}
