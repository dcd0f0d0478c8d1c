//! JSON REST handlers for persisted alerts.

use std::str::FromStr;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use brewlink_app::ports::PersistenceGateway;
use brewlink_domain::alert::AlertRecord;
use brewlink_domain::id::AlertId;

use crate::api::parse_device_id;
use crate::error::ApiError;
use crate::state::AppState;

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 500;

/// Query parameters for the alert list endpoint.
#[derive(Debug, Deserialize)]
pub struct AlertsQuery {
    /// Maximum number of alerts. Defaults to 50, capped at 500.
    pub limit: Option<usize>,
}

/// Possible responses from the alert list endpoint.
pub enum ListResponse {
    /// 200 OK with alerts, newest first.
    Ok(Json<Vec<AlertRecord>>),
}

impl IntoResponse for ListResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Ok(json) => json.into_response(),
        }
    }
}

/// Possible responses from the resolve endpoint.
pub enum ResolveResponse {
    Ok(Json<AlertRecord>),
}

impl IntoResponse for ResolveResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Ok(json) => json.into_response(),
        }
    }
}

/// `GET /api/devices/:id/alerts`
pub async fn list<G: PersistenceGateway>(
    State(state): State<AppState<G>>,
    Path(id): Path<String>,
    Query(params): Query<AlertsQuery>,
) -> Result<ListResponse, ApiError> {
    let device_id = parse_device_id(&id)?;
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    let alerts = state.alert_emitter.recent(device_id, limit).await?;
    Ok(ListResponse::Ok(Json(alerts)))
}

/// `POST /api/alerts/:id/resolve`
///
/// Unknown and already resolved alerts both answer 404.
pub async fn resolve<G: PersistenceGateway>(
    State(state): State<AppState<G>>,
    Path(id): Path<String>,
) -> Result<ResolveResponse, ApiError> {
    let alert_id = AlertId::from_str(&id).map_err(|_| ApiError::alert_not_found(&id))?;
    let record = state
        .alert_emitter
        .resolve(alert_id)
        .await?
        .ok_or_else(|| ApiError::alert_not_found(alert_id))?;
    Ok(ResolveResponse::Ok(Json(record)))
}
