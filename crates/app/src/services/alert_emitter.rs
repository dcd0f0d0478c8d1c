//! Alert emitter: turns crossings into deduplicated, persisted alerts.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use brewlink_domain::alert::{AlertEvent, AlertKind, AlertRecord, Crossing};
use brewlink_domain::error::BrewLinkError;
use brewlink_domain::id::{AlertId, DeviceId};
use brewlink_domain::time::{Timestamp, now, window_start};

use crate::dedupe::DedupeWindow;
use crate::metrics::PipelineMetrics;
use crate::ports::PersistenceGateway;
use crate::retry::{retry_once, with_timeout};

/// Tuning for [`AlertEmitter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertSettings {
    /// Minimum interval between two alerts of the same kind for one device.
    pub cooldown: Duration,
    /// Upper bound on keys kept by the in-memory dedupe window.
    pub dedupe_capacity: usize,
    pub persistence_timeout: Duration,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(30 * 60),
            dedupe_capacity: 10_000,
            persistence_timeout: Duration::from_secs(5),
        }
    }
}

/// What happened to one candidate alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitOutcome {
    Persisted(AlertId),
    /// An alert for the same `(device, kind)` exists within the cooldown.
    Suppressed,
    /// Persisting failed twice; counted in metrics.
    Failed,
}

pub struct AlertEmitter<G> {
    gateway: Arc<G>,
    window: Mutex<DedupeWindow>,
    settings: AlertSettings,
    metrics: Arc<PipelineMetrics>,
}

impl<G: PersistenceGateway> AlertEmitter<G> {
    pub fn new(gateway: Arc<G>, settings: AlertSettings, metrics: Arc<PipelineMetrics>) -> Self {
        Self {
            gateway,
            window: Mutex::new(DedupeWindow::new(
                settings.cooldown,
                settings.dedupe_capacity,
            )),
            settings,
            metrics,
        }
    }

    /// Emit one alert per crossing, in order.
    ///
    /// Alerts are stamped with the time of emission, never with the clock of
    /// the device whose reading caused them, so every cooldown is measured
    /// on one clock.
    pub async fn emit_all(&self, device_id: DeviceId, crossings: &[Crossing]) -> Vec<EmitOutcome> {
        let at = now();
        let mut outcomes = Vec::with_capacity(crossings.len());
        for crossing in crossings {
            outcomes.push(self.emit_at(device_id, crossing, at).await);
        }
        outcomes
    }

    /// Emit the alert for a detected crossing.
    pub async fn emit(&self, device_id: DeviceId, crossing: &Crossing) -> EmitOutcome {
        self.emit_at(device_id, crossing, now()).await
    }

    async fn emit_at(&self, device_id: DeviceId, crossing: &Crossing, at: Timestamp) -> EmitOutcome {
        self.submit(AlertEvent::from_crossing(device_id, crossing, at))
            .await
    }

    /// Raise an externally detected condition (e.g. a malfunction report)
    /// through the same dedupe path as crossings.
    pub async fn raise(
        &self,
        device_id: DeviceId,
        kind: AlertKind,
        message: impl Into<String>,
    ) -> EmitOutcome {
        self.submit(AlertEvent::new(device_id, kind, message, now()))
            .await
    }

    /// Most recent alerts of a device, newest first.
    ///
    /// # Errors
    ///
    /// Returns the gateway error, or [`BrewLinkError::Timeout`].
    pub async fn recent(
        &self,
        device_id: DeviceId,
        limit: usize,
    ) -> Result<Vec<AlertRecord>, BrewLinkError> {
        with_timeout(
            self.settings.persistence_timeout,
            self.gateway.alerts_for_device(device_id, limit),
        )
        .await
    }

    /// Resolve an alert and re-arm its `(device, kind)` key.
    ///
    /// Returns `None` when the alert is unknown or already resolved.
    ///
    /// # Errors
    ///
    /// Returns the gateway error, or [`BrewLinkError::Timeout`].
    #[tracing::instrument(skip(self))]
    pub async fn resolve(&self, alert_id: AlertId) -> Result<Option<AlertRecord>, BrewLinkError> {
        let resolved = with_timeout(
            self.settings.persistence_timeout,
            self.gateway.resolve_alert(alert_id),
        )
        .await?;
        if let Some(record) = &resolved {
            self.lock_window()
                .forget(&(record.alert.device_id, record.alert.kind));
            tracing::info!(device_id = %record.alert.device_id, kind = %record.alert.kind, "alert resolved");
        }
        Ok(resolved)
    }

    #[tracing::instrument(skip(self, alert), fields(device_id = %alert.device_id, kind = %alert.kind))]
    async fn submit(&self, alert: AlertEvent) -> EmitOutcome {
        let key = (alert.device_id, alert.kind);

        if !self.lock_window().reserve(key, alert.timestamp) {
            tracing::debug!("alert suppressed by in-memory cooldown");
            self.metrics.add_alerts_suppressed(1);
            return EmitOutcome::Suppressed;
        }

        let since = window_start(alert.timestamp, self.settings.cooldown);
        match with_timeout(
            self.settings.persistence_timeout,
            self.gateway
                .find_recent_alert(alert.device_id, alert.kind, since),
        )
        .await
        {
            Ok(Some(existing)) => {
                tracing::debug!(%existing, "alert suppressed by persisted alert");
                self.metrics.add_alerts_suppressed(1);
                return EmitOutcome::Suppressed;
            }
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(error = %err, "recent alert lookup failed, emitting anyway");
            }
        }

        let result = retry_once("append_alert", self.settings.persistence_timeout, || {
            self.gateway.append_alert(alert.clone())
        })
        .await;

        match result {
            Ok(alert_id) => {
                tracing::info!(%alert_id, severity = ?alert.severity, message = %alert.message, "alert raised");
                self.metrics.add_alerts_persisted(1);
                EmitOutcome::Persisted(alert_id)
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to persist alert");
                self.lock_window().forget(&key);
                self.metrics.add_alerts_failed(1);
                self.metrics.add_persistence_failures(1);
                EmitOutcome::Failed
            }
        }
    }

    fn lock_window(&self) -> std::sync::MutexGuard<'_, DedupeWindow> {
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
