//! Shared application state for axum handlers.

use std::sync::Arc;

use tokio::sync::watch;

use brewlink_app::metrics::PipelineMetrics;
use brewlink_app::ports::PersistenceGateway;
use brewlink_app::services::{AlertEmitter, BrewProcessor, DeviceStateStore};
use brewlink_app::supervisor::ConnectionState;

/// Application state shared across all axum handlers.
///
/// Generic over the persistence gateway to avoid dynamic dispatch.
/// `Clone` is implemented manually so `G` itself does not need to be
/// `Clone`; only the `Arc` wrappers are cloned.
pub struct AppState<G> {
    pub brew_processor: Arc<BrewProcessor<G>>,
    pub alert_emitter: Arc<AlertEmitter<G>>,
    pub store: Arc<DeviceStateStore>,
    pub metrics: Arc<PipelineMetrics>,
    /// Latest state published by the connection supervisor.
    pub connection: watch::Receiver<ConnectionState>,
}

impl<G> Clone for AppState<G> {
    fn clone(&self) -> Self {
        Self {
            brew_processor: Arc::clone(&self.brew_processor),
            alert_emitter: Arc::clone(&self.alert_emitter),
            store: Arc::clone(&self.store),
            metrics: Arc::clone(&self.metrics),
            connection: self.connection.clone(),
        }
    }
}

impl<G: PersistenceGateway> AppState<G> {
    pub fn new(
        brew_processor: Arc<BrewProcessor<G>>,
        alert_emitter: Arc<AlertEmitter<G>>,
        store: Arc<DeviceStateStore>,
        metrics: Arc<PipelineMetrics>,
        connection: watch::Receiver<ConnectionState>,
    ) -> Self {
        Self {
            brew_processor,
            alert_emitter,
            store,
            metrics,
            connection,
        }
    }
}
