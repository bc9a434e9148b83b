use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use haven_core::PaymentProviderKind;
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::AppError;
use crate::middleware::customer_auth_middleware;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct CaptureResponse {
    pub provider: PaymentProviderKind,
    pub reference: String,
    pub captured: bool,
}

pub fn routes(state: AppState) -> Router<AppState> {
    let capture = Router::new()
        .route("/v1/payments/{provider}/capture/{reference}", post(capture_payment))
        .route_layer(axum::middleware::from_fn_with_state(state, customer_auth_middleware));

    Router::new()
        .route("/v1/payments/stripe/config", get(stripe_config))
        .merge(capture)
}

/// POST /v1/payments/{provider}/capture/{reference}
pub async fn capture_payment(
    State(state): State<AppState>,
    Path((provider, reference)): Path<(String, String)>,
) -> Result<Json<CaptureResponse>, AppError> {
    let provider: PaymentProviderKind = provider.parse().map_err(AppError::ValidationError)?;
    state.coordinator.capture_payment(provider, &reference).await?;

    Ok(Json(CaptureResponse {
        provider,
        reference,
        captured: true,
    }))
}

/// GET /v1/payments/stripe/config
pub async fn stripe_config(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "publishable_key": state.stripe_publishable_key }))
}
