//! Brew resource processor: request/response brewing with atomic deduction.
//!
//! A brew is refused (as a [`BrewResult`] value, never as an error) when the
//! command is invalid, the device is not operational, or any of water, milk
//! and beans cannot cover the recipe. Otherwise all three deductions land in
//! a single reconciler call, so crossing detection observes their net effect.

use std::sync::Arc;
use std::time::Duration;

use brewlink_domain::brew::{
    BrewCommand, BrewFailure, BrewResult, Capacities, ResourceConsumption, Shortfall,
};
use brewlink_domain::error::ValidationError;
use brewlink_domain::time::now;

use crate::metrics::PipelineMetrics;
use crate::ports::PersistenceGateway;
use crate::retry::retry_once;
use crate::services::alert_emitter::AlertEmitter;
use crate::services::state_store::DeviceStateStore;

enum Refusal {
    NotOperational(&'static str),
    Insufficient(Shortfall),
}

pub struct BrewProcessor<G> {
    store: Arc<DeviceStateStore>,
    emitter: Arc<AlertEmitter<G>>,
    gateway: Arc<G>,
    capacities: Capacities,
    persistence_timeout: Duration,
    metrics: Arc<PipelineMetrics>,
}

impl<G: PersistenceGateway> BrewProcessor<G> {
    pub fn new(
        store: Arc<DeviceStateStore>,
        emitter: Arc<AlertEmitter<G>>,
        gateway: Arc<G>,
        persistence_timeout: Duration,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            store,
            emitter,
            gateway,
            capacities: Capacities::default(),
            persistence_timeout,
            metrics,
        }
    }

    #[must_use]
    pub fn with_capacities(mut self, capacities: Capacities) -> Self {
        self.capacities = capacities;
        self
    }

    /// Validate, check operability and supplies, then deduct atomically.
    #[tracing::instrument(
        skip(self, command),
        fields(device_id = %command.device_id, brew_type = %command.brew_type)
    )]
    pub async fn process(&self, command: BrewCommand) -> BrewResult {
        if let Err(err) = command.validate() {
            return self.reject(&err);
        }

        let consumption = ResourceConsumption::for_command(&command, &self.capacities);
        let thresholds = *self.store.thresholds();

        let outcome = self
            .store
            .try_apply(command.device_id, |state| {
                let Some(state) = state else {
                    return Err(Refusal::NotOperational("device has never reported"));
                };
                if !state.active {
                    return Err(Refusal::NotOperational("device is inactive"));
                }
                if !state.is_operational(&thresholds) {
                    return Err(Refusal::NotOperational(
                        "device is off or critically low on supplies",
                    ));
                }
                consumption
                    .deduct_from(&state.levels)
                    .map_err(Refusal::Insufficient)
            })
            .await;

        let reconciliation = match outcome {
            Ok(reconciliation) => reconciliation,
            Err(Refusal::NotOperational(reason)) => {
                tracing::info!(reason, "brew refused");
                self.metrics.add_brews_rejected(1);
                return BrewResult::refused(
                    BrewFailure::NotOperational,
                    format!("Machine is not operational: {reason}"),
                );
            }
            Err(Refusal::Insufficient(shortfall)) => {
                tracing::info!(
                    supply = %shortfall.supply,
                    required = shortfall.required,
                    available = shortfall.available,
                    "brew refused"
                );
                self.metrics.add_brews_rejected(1);
                return BrewResult::refused(
                    BrewFailure::InsufficientSupply,
                    format!(
                        "Insufficient {}: need {:.1}%, have {:.1}%",
                        shortfall.supply, shortfall.required, shortfall.available
                    ),
                );
            }
        };

        let at = now();
        if let Err(err) = retry_once("append_usage", self.persistence_timeout, || {
            self.gateway
                .append_usage(command.device_id, command.brew_type, at)
        })
        .await
        {
            tracing::error!(error = %err, "failed to record usage");
            self.metrics.add_persistence_failures(1);
        }

        self.emitter
            .emit_all(command.device_id, &reconciliation.crossings)
            .await;

        self.metrics.add_brews_succeeded(1);
        BrewResult::brewed(format!("{} brewed successfully", command.brew_type))
    }

    /// Answer a request that could not even be turned into a command.
    pub fn reject(&self, err: &ValidationError) -> BrewResult {
        tracing::debug!(error = %err, "brew command rejected");
        self.metrics.add_brews_rejected(1);
        BrewResult::refused(BrewFailure::InvalidCommand, err.to_string())
    }
}
