use std::time::Duration;

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::middleware::admin_auth_middleware;
use crate::reservations::ReservationSummary;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StaleQuery {
    pub older_than_seconds: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct StaleReservations {
    pub older_than_seconds: u64,
    pub count: usize,
    pub reservations: Vec<ReservationSummary>,
}

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/v1/admin/reservations/stale", get(stale_reservations))
        .route_layer(axum::middleware::from_fn_with_state(state, admin_auth_middleware))
}

/// GET /v1/admin/reservations/stale
///
/// PENDING reservations older than the threshold, defaulting to
/// `reservation.stale_pending_seconds`.
pub async fn stale_reservations(
    State(state): State<AppState>,
    Query(query): Query<StaleQuery>,
) -> Result<Json<StaleReservations>, AppError> {
    let older_than = query
        .older_than_seconds
        .map(Duration::from_secs)
        .unwrap_or(state.stale_pending_default);

    let stale = state.coordinator.stale_pending(older_than).await?;
    if !stale.is_empty() {
        tracing::warn!(count = stale.len(), "stale pending reservations found");
    }

    Ok(Json(StaleReservations {
        older_than_seconds: older_than.as_secs(),
        count: stale.len(),
        reservations: stale.into_iter().map(ReservationSummary::from).collect(),
    }))
}
