//! JSON REST handlers for reconciled device state.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use brewlink_app::ports::PersistenceGateway;
use brewlink_app::services::EmitOutcome;
use brewlink_domain::alert::AlertKind;
use brewlink_domain::device::DeviceState;
use brewlink_domain::id::AlertId;

use crate::api::parse_device_id;
use crate::error::ApiError;
use crate::state::AppState;

/// Possible responses from the list endpoint.
pub enum ListResponse {
    Ok(Json<Vec<DeviceState>>),
}

impl IntoResponse for ListResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Ok(json) => json.into_response(),
        }
    }
}

/// Possible responses from the get endpoint.
pub enum GetResponse {
    Ok(Json<DeviceState>),
}

impl IntoResponse for GetResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Ok(json) => json.into_response(),
        }
    }
}

/// Possible responses from the deactivate endpoint.
pub enum DeactivateResponse {
    NoContent,
}

impl IntoResponse for DeactivateResponse {
    fn into_response(self) -> Response {
        match self {
            Self::NoContent => StatusCode::NO_CONTENT.into_response(),
        }
    }
}

/// Request body for a malfunction report.
#[derive(Debug, Deserialize)]
pub struct MalfunctionReport {
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RaisedAlert {
    pub alert_id: AlertId,
}

/// Possible responses from the malfunction endpoint.
pub enum MalfunctionResponse {
    Created(Json<RaisedAlert>),
    /// Same malfunction already reported within the cooldown.
    Suppressed,
    Unavailable,
}

impl IntoResponse for MalfunctionResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Created(json) => (StatusCode::CREATED, json).into_response(),
            Self::Suppressed => StatusCode::OK.into_response(),
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE.into_response(),
        }
    }
}

/// `GET /api/devices`
pub async fn list<G: PersistenceGateway>(
    State(state): State<AppState<G>>,
) -> Result<ListResponse, ApiError> {
    let mut devices = Vec::new();
    for device_id in state.store.device_ids().await {
        if let Some(snapshot) = state.store.snapshot(device_id).await {
            devices.push(snapshot);
        }
    }
    Ok(ListResponse::Ok(Json(devices)))
}

/// `GET /api/devices/:id`
pub async fn get<G: PersistenceGateway>(
    State(state): State<AppState<G>>,
    Path(id): Path<String>,
) -> Result<GetResponse, ApiError> {
    let device_id = parse_device_id(&id)?;
    let snapshot = state
        .store
        .snapshot(device_id)
        .await
        .ok_or_else(|| ApiError::device_not_found(device_id))?;
    Ok(GetResponse::Ok(Json(snapshot)))
}

/// `POST /api/devices/:id/deactivate`
pub async fn deactivate<G: PersistenceGateway>(
    State(state): State<AppState<G>>,
    Path(id): Path<String>,
) -> Result<DeactivateResponse, ApiError> {
    let device_id = parse_device_id(&id)?;
    if !state.store.deactivate(device_id).await {
        return Err(ApiError::device_not_found(device_id));
    }
    tracing::info!(%device_id, "device deactivated");
    Ok(DeactivateResponse::NoContent)
}

/// `POST /api/devices/:id/malfunction`
pub async fn report_malfunction<G: PersistenceGateway>(
    State(state): State<AppState<G>>,
    Path(id): Path<String>,
    Json(report): Json<MalfunctionReport>,
) -> Result<MalfunctionResponse, ApiError> {
    let device_id = parse_device_id(&id)?;
    if state.store.snapshot(device_id).await.is_none() {
        return Err(ApiError::device_not_found(device_id));
    }
    let outcome = state
        .alert_emitter
        .raise(device_id, AlertKind::Malfunction, report.message)
        .await;
    Ok(match outcome {
        EmitOutcome::Persisted(alert_id) => MalfunctionResponse::Created(Json(RaisedAlert { alert_id })),
        EmitOutcome::Suppressed => MalfunctionResponse::Suppressed,
        EmitOutcome::Failed => MalfunctionResponse::Unavailable,
    })
}
