use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use haven_core::{PaymentHandle, Reservation, ReservationRequest, ReservationStatus};
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::{customer_auth_middleware, Claims};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ReservationResponse {
    pub reservation_id: Uuid,
    pub status: ReservationStatus,
    pub payment: PaymentHandle,
}

/// Public view of a reservation; guest contact details stay out.
#[derive(Debug, Serialize)]
pub struct ReservationSummary {
    pub id: Uuid,
    pub room_id: Uuid,
    pub from_time: DateTime<Utc>,
    pub to_time: DateTime<Utc>,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
}

impl From<Reservation> for ReservationSummary {
    fn from(reservation: Reservation) -> Self {
        Self {
            id: reservation.id,
            room_id: reservation.room_id,
            from_time: reservation.window.from,
            to_time: reservation.window.to,
            status: reservation.status,
            created_at: reservation.created_at,
        }
    }
}

pub fn routes(state: AppState) -> Router<AppState> {
    let booking = Router::new()
        .route("/v1/reservations", post(create_reservation))
        .route_layer(axum::middleware::from_fn_with_state(state, customer_auth_middleware));

    Router::new()
        .route("/v1/rooms/{room_id}/reservations", get(list_room_reservations))
        .merge(booking)
}

/// POST /v1/reservations
pub async fn create_reservation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<ReservationRequest>, JsonRejection>,
) -> Result<Json<ReservationResponse>, AppError> {
    let Json(mut request) = payload.map_err(|rejection| AppError::ValidationError(rejection.body_text()))?;
    request.booked_by = Some(claims.sub);

    let receipt = state.coordinator.reserve_room(request).await?;
    tracing::info!(
        reservation_id = %receipt.reservation.id,
        room_id = %receipt.reservation.room_id,
        "reservation created"
    );

    Ok(Json(ReservationResponse {
        reservation_id: receipt.reservation.id,
        status: receipt.reservation.status,
        payment: receipt.payment,
    }))
}

/// GET /v1/rooms/{room_id}/reservations
pub async fn list_room_reservations(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
) -> Result<Json<Vec<ReservationSummary>>, AppError> {
    let reservations = state.coordinator.room_reservations(room_id).await?;
    Ok(Json(reservations.into_iter().map(ReservationSummary::from).collect()))
}
