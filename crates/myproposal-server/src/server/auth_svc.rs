//! Account routes: credentials sign-up and login, refresh-token rotation,
//! logout, Google OAuth and the current-user profile.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use super::error::ApiError;
use super::state::AppState;
use crate::auth::oauth::PROVIDER_GOOGLE;
use crate::auth::{Claims, JwtManager, password};
use crate::messaging::validate::is_valid_email;
use crate::storage::{DatabaseError, NewUser, User};

const MAX_NAME_CHARS: usize = 100;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in_secs: i64,
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct AuthorizationUrl {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct OAuthCallback {
    pub code: String,
    pub state: String,
}

/// `POST /api/auth/register`
#[instrument(skip_all)]
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    let email = req.email.trim().to_ascii_lowercase();
    if !is_valid_email(&email) {
        return Err(ApiError::bad_request("A valid email is required"));
    }
    if !password::is_acceptable_password(&req.password) {
        return Err(ApiError::bad_request(format!(
            "Password must be at least {} characters",
            password::MIN_PASSWORD_LEN
        )));
    }
    let name = req.name.as_deref().map(str::trim).filter(|n| !n.is_empty());
    if name.is_some_and(|n| n.chars().count() > MAX_NAME_CHARS) {
        return Err(ApiError::bad_request("Name is too long"));
    }

    match state.db.get_user_by_email(&email).await {
        Ok(_) => return Err(ApiError::Conflict("Email already registered".into())),
        Err(DatabaseError::NotFound(_)) => {}
        Err(e) => return Err(e.into()),
    }

    let hash = password::hash_password(&req.password).map_err(ApiError::internal)?;
    let user_id = uuid::Uuid::new_v4().to_string();
    let user = state
        .db
        .create_user(&NewUser {
            id: &user_id,
            email: &email,
            name,
            password_hash: Some(&hash),
            initial_credits: state.config.credits.free_credits,
            ..NewUser::default()
        })
        .await?;

    info!(user_id = %user.id, "User registered");
    let session = issue_session(&state, user).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// `POST /api/auth/login`
#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let invalid = ApiError::Unauthorized("Invalid credentials");

    let user = match state.db.get_user_by_email(req.email.trim()).await {
        Ok(user) => user,
        Err(DatabaseError::NotFound(_)) => return Err(invalid),
        Err(e) => return Err(e.into()),
    };
    // OAuth-only accounts have no password to check.
    let Some(hash) = user.password_hash.as_deref() else {
        return Err(invalid);
    };

    let valid = password::verify_password(&req.password, hash).map_err(ApiError::internal)?;
    if !valid {
        warn!(user_id = %user.id, "Failed login attempt");
        return Err(invalid);
    }

    info!(user_id = %user.id, "User logged in");
    Ok(Json(issue_session(&state, user).await?))
}

/// `POST /api/auth/refresh`
///
/// Rotates the refresh token. The user row is re-read, so the new access
/// token carries the current tier and role.
#[instrument(skip_all)]
pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let claims = state
        .jwt
        .validate(&req.refresh_token)
        .map_err(|_| ApiError::Unauthorized("Invalid refresh token"))?;
    if !claims.is_refresh() {
        return Err(ApiError::Unauthorized("Not a refresh token"));
    }

    let token_hash = JwtManager::hash_token(&req.refresh_token);
    let stored = state
        .db
        .get_token_by_hash(&token_hash)
        .await?
        .ok_or(ApiError::Unauthorized("Refresh token revoked or expired"))?;

    if !state.db.revoke_token(&stored.id).await? {
        return Err(ApiError::Unauthorized("Refresh token revoked or expired"));
    }

    let user = match state.db.get_user(&stored.user_id).await {
        Ok(user) => user,
        Err(DatabaseError::NotFound(_)) => return Err(ApiError::Unauthorized("Unknown user")),
        Err(e) => return Err(e.into()),
    };
    Ok(Json(issue_session(&state, user).await?))
}

/// `POST /api/auth/logout`
///
/// Always succeeds; an unknown token is already as good as revoked.
#[instrument(skip_all)]
pub async fn logout(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> Result<StatusCode, ApiError> {
    let token_hash = JwtManager::hash_token(&req.refresh_token);
    if let Some(token) = state.db.get_token_by_hash(&token_hash).await? {
        state.db.revoke_token(&token.id).await?;
        info!(user_id = %token.user_id, "Refresh token revoked");
    }
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/auth/oauth/google`
#[instrument(skip_all)]
pub async fn google_authorize(
    State(state): State<AppState>,
) -> Result<Json<AuthorizationUrl>, ApiError> {
    let oauth = state.oauth.as_ref().ok_or(ApiError::Unavailable("Google sign-in"))?;
    let oauth_state = state.jwt.issue_oauth_state()?;
    let url = oauth.authorization_url(&oauth_state)?;
    Ok(Json(AuthorizationUrl { url }))
}

/// `GET /api/auth/oauth/google/callback`
///
/// Signs in the account linked to the Google identity, links it to an
/// existing account with the same email, or creates a new FREE account.
#[instrument(skip_all)]
pub async fn google_callback(
    State(state): State<AppState>,
    Query(params): Query<OAuthCallback>,
) -> Result<Json<SessionResponse>, ApiError> {
    let oauth = state.oauth.as_ref().ok_or(ApiError::Unavailable("Google sign-in"))?;

    let valid_state = state
        .jwt
        .validate(&params.state)
        .is_ok_and(|claims| claims.is_oauth_state());
    if !valid_state {
        return Err(ApiError::Unauthorized("Invalid OAuth state"));
    }

    let profile = oauth.exchange_code(&params.code).await?;

    let user = if let Some(user) = state.db.get_user_by_oauth(PROVIDER_GOOGLE, &profile.sub).await? {
        user
    } else {
        match state.db.get_user_by_email(&profile.email).await {
            Ok(existing) => {
                state
                    .db
                    .link_oauth_identity(&existing.id, PROVIDER_GOOGLE, &profile.sub)
                    .await?;
                info!(user_id = %existing.id, "Linked Google identity");
                existing
            }
            Err(DatabaseError::NotFound(_)) => {
                let user_id = uuid::Uuid::new_v4().to_string();
                let email = profile.email.to_ascii_lowercase();
                let user = state
                    .db
                    .create_user(&NewUser {
                        id: &user_id,
                        email: &email,
                        name: profile.name.as_deref(),
                        oauth_provider: Some(PROVIDER_GOOGLE),
                        oauth_subject: Some(&profile.sub),
                        initial_credits: state.config.credits.free_credits,
                        ..NewUser::default()
                    })
                    .await?;
                info!(user_id = %user.id, "User registered via Google");
                user
            }
            Err(e) => return Err(e.into()),
        }
    };

    Ok(Json(issue_session(&state, user).await?))
}

/// `GET /api/me`
pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.db.get_user(&claims.sub).await?))
}

async fn issue_session(state: &AppState, user: User) -> Result<SessionResponse, ApiError> {
    let (access_token, expires_in_secs) = state.jwt.issue_access_token(&user)?;
    let (refresh_token, refresh_exp) = state.jwt.issue_refresh_token(&user)?;

    let token_id = uuid::Uuid::new_v4().to_string();
    let token_hash = JwtManager::hash_token(&refresh_token);
    state
        .db
        .create_token(&token_id, &user.id, &token_hash, refresh_exp)
        .await?;

    Ok(SessionResponse {
        access_token,
        refresh_token,
        expires_in_secs,
        user,
    })
}
