use axum::{
    Extension,
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, Validation, decode};

use scribe_types::api::Claims;

use crate::error::ApiError;
use crate::state::{AppState, blocking};

/// Extract and validate the JWT from the Authorization header.
///
/// The user must still exist and not be suspended. The role in the
/// forwarded claims is refreshed from the stored record, so a role or
/// status change takes effect without waiting for the token to expire.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| ApiError::Unauthorized)?;

    let mut claims = token_data.claims;
    let user_id = claims.sub;
    let user = blocking(&state, move |db| Ok(db.get_user(user_id)?))
        .await?
        .ok_or(ApiError::Unauthorized)?;
    if user.is_suspended() {
        return Err(ApiError::Forbidden("account suspended"));
    }
    claims.role = user.role;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Must run after [`require_auth`].
pub async fn require_admin(
    Extension(claims): Extension<Claims>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !claims.is_admin() {
        return Err(ApiError::Forbidden("admin access required"));
    }
    Ok(next.run(req).await)
}
