use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use haven_booking::WebhookEvent;
use serde_json::{json, Value};

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/payments/webhook", post(payment_webhook))
}

/// POST /v1/payments/webhook
///
/// Always acknowledged with 200; the disposition only reaches logs and metrics.
pub async fn payment_webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Json<Value> {
    let event = headers
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|value| (name.as_str(), value)))
        .fold(WebhookEvent::new(body.to_vec()), |event, (name, value)| {
            event.with_header(name, value)
        });

    let disposition = state.coordinator.payment_webhook(&event).await;
    tracing::debug!(disposition = disposition.label(), "payment webhook acknowledged");

    Json(json!({ "received": true }))
}
