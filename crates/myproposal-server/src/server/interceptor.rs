//! Authentication middleware for the HTTP router.

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use tracing::warn;

use super::error::ApiError;
use super::state::AppState;
use crate::auth::Claims;
use crate::storage::{DatabaseError, Role};

/// Read the `Authorization: Bearer <token>` value.
pub fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Validate the access token and attach its [`Claims`] to the request.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(&req).ok_or(ApiError::Unauthorized("Missing authorization header"))?;

    let claims = state
        .jwt
        .validate(token)
        .map_err(|_| ApiError::Unauthorized("Invalid token"))?;

    if !claims.is_access() {
        return Err(ApiError::Unauthorized("Not an access token"));
    }

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Admin gate, layered inside [`require_auth`].
///
/// The role is re-read from the database so a demotion takes effect before
/// the access token expires.
pub async fn require_admin(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let claims = req
        .extensions()
        .get::<Claims>()
        .ok_or(ApiError::Unauthorized("Missing authorization header"))?;

    let role = match state.db.get_user(&claims.sub).await {
        Ok(user) => user.role,
        Err(DatabaseError::NotFound(_)) => return Err(ApiError::Unauthorized("Unknown user")),
        Err(e) => return Err(e.into()),
    };

    if role != Role::Admin {
        warn!(user_id = %claims.sub, "Non-admin attempted admin route");
        return Err(ApiError::Forbidden);
    }

    Ok(next.run(req).await)
}
