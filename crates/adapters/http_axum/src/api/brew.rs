//! Brew command endpoint.

use std::str::FromStr;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use brewlink_app::ports::PersistenceGateway;
use brewlink_domain::brew::{BrewCommand, BrewFailure, BrewResult, BrewType};
use brewlink_domain::error::ValidationError;
use brewlink_domain::id::DeviceId;

use crate::api::parse_device_id;
use crate::error::ApiError;
use crate::state::AppState;

/// Request body for a brew; absent numbers take the command defaults.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrewRequest {
    pub brew_type: String,
    pub size: Option<f64>,
    pub strength: Option<f64>,
    pub milk_ratio: Option<f64>,
    pub temperature: Option<f64>,
}

impl BrewRequest {
    /// # Errors
    ///
    /// Fails on an unknown brew type; ranges are checked by the processor.
    pub fn into_command(self, device_id: DeviceId) -> Result<BrewCommand, ValidationError> {
        let mut command = BrewCommand::new(device_id, BrewType::from_str(&self.brew_type)?);
        if let Some(size) = self.size {
            command = command.with_size(size);
        }
        if let Some(strength) = self.strength {
            command = command.with_strength(strength);
        }
        if let Some(milk_ratio) = self.milk_ratio {
            command = command.with_milk_ratio(milk_ratio);
        }
        if let Some(temperature) = self.temperature {
            command = command.with_temperature(temperature);
        }
        Ok(command)
    }
}

/// Possible responses from the brew endpoint.
pub enum BrewResponse {
    Brewed(Json<BrewResult>),
    Invalid(Json<BrewResult>),
    /// Not operational or short on supplies.
    Refused(Json<BrewResult>),
}

impl From<BrewResult> for BrewResponse {
    fn from(result: BrewResult) -> Self {
        match result.failure {
            None => Self::Brewed(Json(result)),
            Some(BrewFailure::InvalidCommand) => Self::Invalid(Json(result)),
            Some(BrewFailure::NotOperational | BrewFailure::InsufficientSupply) => {
                Self::Refused(Json(result))
            }
        }
    }
}

impl IntoResponse for BrewResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Brewed(json) => json.into_response(),
            Self::Invalid(json) => (StatusCode::BAD_REQUEST, json).into_response(),
            Self::Refused(json) => (StatusCode::CONFLICT, json).into_response(),
        }
    }
}

/// `POST /api/devices/:id/brew`
pub async fn brew<G: PersistenceGateway>(
    State(state): State<AppState<G>>,
    Path(id): Path<String>,
    Json(request): Json<BrewRequest>,
) -> Result<BrewResponse, ApiError> {
    let device_id = parse_device_id(&id)?;
    let result = match request.into_command(device_id) {
        Ok(command) => state.brew_processor.process(command).await,
        Err(err) => state.brew_processor.reject(&err),
    };
    Ok(result.into())
}
