use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;

const CUSTOMER_ROLES: &[&str] = &["CUSTOMER", "GUEST"];
const ADMIN_ROLES: &[&str] = &["ADMIN", "SUPER_ADMIN"];

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    #[serde(default)]
    pub email: Option<String>,
    pub exp: usize,
}

fn bearer_claims(state: &AppState, req: &Request) -> Result<Claims, AppError> {
    let Authorization(bearer) = req
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .ok_or_else(|| AppError::AuthenticationError("missing bearer token".to_string()))?;

    decode::<Claims>(
        bearer.token(),
        &DecodingKey::from_secret(state.auth.secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| AppError::AuthenticationError("invalid or expired token".to_string()))
}

async fn require_role(
    state: AppState,
    mut req: Request,
    next: Next,
    roles: &[&str],
) -> Result<Response, AppError> {
    let claims = bearer_claims(&state, &req)?;
    if !roles.contains(&claims.role.as_str()) {
        return Err(AppError::AuthorizationError(format!("role {} may not do this", claims.role)));
    }
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Guests and customers may book and pay.
pub async fn customer_auth_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    require_role(state, req, next, CUSTOMER_ROLES).await
}

pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    require_role(state, req, next, ADMIN_ROLES).await
}
