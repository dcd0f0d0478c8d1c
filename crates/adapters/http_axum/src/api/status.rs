//! Operator endpoints: pipeline counters and connection state.

use axum::Json;
use axum::extract::State;

use brewlink_app::metrics::MetricsSnapshot;
use brewlink_app::ports::PersistenceGateway;
use brewlink_app::supervisor::ConnectionState;

use crate::state::AppState;

/// `GET /api/metrics`
pub async fn metrics<G: PersistenceGateway>(
    State(state): State<AppState<G>>,
) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

/// `GET /api/connection`
pub async fn connection<G: PersistenceGateway>(
    State(state): State<AppState<G>>,
) -> Json<ConnectionState> {
    Json(state.connection.borrow().clone())
}
