use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use haven_core::ReservationError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("authentication failed: {0}")]
    AuthenticationError(String),
    #[error("not authorized: {0}")]
    AuthorizationError(String),
    #[error("invalid request: {0}")]
    ValidationError(String),
    #[error(transparent)]
    Reservation(#[from] ReservationError),
}

impl AppError {
    fn parts(self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, "unauthenticated", msg),
            AppError::AuthorizationError(msg) => (StatusCode::FORBIDDEN, "forbidden", msg),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, "invalid_input", msg),
            AppError::Reservation(err) => {
                let code = err.code();
                match err {
                    ReservationError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, code, msg),
                    ReservationError::Conflict { .. } => (StatusCode::BAD_REQUEST, code, err.to_string()),
                    ReservationError::NotFound(_) => (StatusCode::NOT_FOUND, code, err.to_string()),
                    ReservationError::UpstreamUnavailable(ref cause) => {
                        tracing::error!(error = %cause, "payment provider unavailable");
                        (
                            StatusCode::INTERNAL_SERVER_ERROR,
                            code,
                            "payment provider unavailable, please retry".to_string(),
                        )
                    }
                    ReservationError::StorageFailure(ref cause) => {
                        tracing::error!(error = %cause, "storage failure");
                        (StatusCode::INTERNAL_SERVER_ERROR, code, "Internal Server Error".to_string())
                    }
                }
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        let body = Json(json!({
            "error": message,
            "code": code,
        }));
        (status, body).into_response()
    }
}
