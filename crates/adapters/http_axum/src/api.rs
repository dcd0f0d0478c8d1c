//! JSON REST API handler modules.

#[allow(clippy::missing_errors_doc)]
pub mod alerts;
#[allow(clippy::missing_errors_doc)]
pub mod brew;
#[allow(clippy::missing_errors_doc)]
pub mod devices;
pub mod status;

use std::str::FromStr;

use axum::Router;
use axum::routing::{get, post};

use brewlink_app::ports::PersistenceGateway;
use brewlink_domain::id::DeviceId;

use crate::error::ApiError;
use crate::state::AppState;

/// Build the `/api` sub-router.
pub fn routes<G: PersistenceGateway>() -> Router<AppState<G>> {
    Router::new()
        // Devices
        .route("/devices", get(devices::list::<G>))
        .route("/devices/{id}", get(devices::get::<G>))
        .route("/devices/{id}/deactivate", post(devices::deactivate::<G>))
        .route("/devices/{id}/malfunction", post(devices::report_malfunction::<G>))
        // Alerts
        .route("/devices/{id}/alerts", get(alerts::list::<G>))
        .route("/alerts/{id}/resolve", post(alerts::resolve::<G>))
        // Brewing
        .route("/devices/{id}/brew", post(brew::brew::<G>))
        // Operations
        .route("/metrics", get(status::metrics::<G>))
        .route("/connection", get(status::connection::<G>))
}

fn parse_device_id(raw: &str) -> Result<DeviceId, ApiError> {
    DeviceId::from_str(raw).map_err(|_| ApiError::device_not_found(raw))
}
