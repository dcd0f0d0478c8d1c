//! HTTP error response mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use brewlink_domain::error::{BrewLinkError, NotFoundError};

/// JSON error body returned by API endpoints.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Maps [`BrewLinkError`] to an HTTP response with appropriate status code.
#[derive(Debug)]
pub struct ApiError(BrewLinkError);

impl ApiError {
    /// No reconciled state for `id`; also used for ids that do not parse.
    pub fn device_not_found(id: impl ToString) -> Self {
        Self(BrewLinkError::NotFound(NotFoundError {
            entity: "device",
            id: id.to_string(),
        }))
    }

    /// No open alert with this id; also used for ids that do not parse.
    pub fn alert_not_found(id: impl ToString) -> Self {
        Self(BrewLinkError::NotFound(NotFoundError {
            entity: "alert",
            id: id.to_string(),
        }))
    }
}

impl From<BrewLinkError> for ApiError {
    fn from(err: BrewLinkError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            BrewLinkError::Validation(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            BrewLinkError::NotFound(err) => (StatusCode::NOT_FOUND, err.to_string()),
            BrewLinkError::Persistence(err) => {
                tracing::error!(error = %err, "persistence error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
            BrewLinkError::Timeout(limit) => {
                tracing::error!(?limit, "request timed out");
                (StatusCode::GATEWAY_TIMEOUT, self.0.to_string())
            }
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}
