//! Persistence port: the long-term record of readings, usage and alerts.

use std::future::Future;

use brewlink_domain::alert::{AlertEvent, AlertKind, AlertRecord};
use brewlink_domain::brew::BrewType;
use brewlink_domain::error::BrewLinkError;
use brewlink_domain::id::{AlertId, DeviceId};
use brewlink_domain::reading::TelemetryReading;
use brewlink_domain::time::Timestamp;

/// Gateway to whatever store keeps the history of the fleet.
///
/// Calls may be slow or fail; callers wrap them with a timeout (see
/// [`crate::retry`]) and never hold a device lock while awaiting them.
pub trait PersistenceGateway: Send + Sync + 'static {
    /// Append a decoded reading to the telemetry log.
    fn save_reading(
        &self,
        reading: TelemetryReading,
    ) -> impl Future<Output = Result<(), BrewLinkError>> + Send;

    /// Record that `device_id` brewed one unit of `brew_type`.
    fn append_usage(
        &self,
        device_id: DeviceId,
        brew_type: BrewType,
        at: Timestamp,
    ) -> impl Future<Output = Result<(), BrewLinkError>> + Send;

    /// Persist a new alert and return its identifier.
    fn append_alert(
        &self,
        alert: AlertEvent,
    ) -> impl Future<Output = Result<AlertId, BrewLinkError>> + Send;

    /// Find an unresolved alert of `kind` for `device_id` created at or after `since`.
    fn find_recent_alert(
        &self,
        device_id: DeviceId,
        kind: AlertKind,
        since: Timestamp,
    ) -> impl Future<Output = Result<Option<AlertId>, BrewLinkError>> + Send;

    /// Most recent alerts of `device_id`, newest first, at most `limit`.
    fn alerts_for_device(
        &self,
        device_id: DeviceId,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<AlertRecord>, BrewLinkError>> + Send;

    /// Mark an alert as resolved and return it.
    ///
    /// Returns `None` when the alert does not exist or was already resolved.
    fn resolve_alert(
        &self,
        id: AlertId,
    ) -> impl Future<Output = Result<Option<AlertRecord>, BrewLinkError>> + Send;
}
