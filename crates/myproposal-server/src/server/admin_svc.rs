//! Admin routes. Every mutation writes an audit log entry.
//!
//! Mounted behind `require_auth` and `require_admin`.

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument};

use super::Page;
use super::error::ApiError;
use super::state::AppState;
use crate::auth::Claims;
use crate::storage::{AuditLog, Role, Transaction, User};

#[derive(Debug, Serialize)]
pub struct UserList {
    pub users: Vec<User>,
    pub total: i64,
}

#[derive(Debug, Deserialize)]
pub struct GrantRequest {
    pub amount: i64,
}

#[derive(Debug, Serialize)]
pub struct GrantResponse {
    pub remaining: i64,
}

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub role: Role,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionQuery {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: Option<u32>,
}

/// `GET /api/admin/users`
pub async fn list_users(
    State(state): State<AppState>,
    Query(page): Query<Page>,
) -> Result<Json<UserList>, ApiError> {
    let (limit, offset) = page.bounds();
    let users = state.db.list_users(limit, offset).await?;
    let total = state.db.count_users().await?;
    Ok(Json(UserList { users, total }))
}

/// `POST /api/admin/users/{id}/credits`
#[instrument(skip_all, fields(admin_id = %claims.sub, user_id = %id))]
pub async fn grant_credits(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    Json(req): Json<GrantRequest>,
) -> Result<Json<GrantResponse>, ApiError> {
    let remaining = state.ledger.grant_credits(&id, req.amount).await?;

    audit(
        &state,
        &claims.sub,
        "credits.grant",
        &id,
        &json!({ "amount": req.amount, "remaining": remaining }),
    )
    .await?;
    info!(amount = req.amount, remaining, "Admin granted credits");
    Ok(Json(GrantResponse { remaining }))
}

/// `POST /api/admin/users/{id}/role`
#[instrument(skip_all, fields(admin_id = %claims.sub, user_id = %id))]
pub async fn set_role(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    Json(req): Json<RoleRequest>,
) -> Result<Json<User>, ApiError> {
    let previous = state.db.get_user(&id).await?.role;
    if !state.db.set_role(&id, req.role).await? {
        return Err(ApiError::NotFound("User not found".into()));
    }

    audit(
        &state,
        &claims.sub,
        "role.change",
        &id,
        &json!({ "from": previous.as_str(), "to": req.role.as_str() }),
    )
    .await?;
    info!(role = req.role.as_str(), "Admin changed role");
    Ok(Json(state.db.get_user(&id).await?))
}

/// `GET /api/admin/audit-logs`
pub async fn audit_logs(
    State(state): State<AppState>,
    Query(page): Query<Page>,
) -> Result<Json<Vec<AuditLog>>, ApiError> {
    let (limit, offset) = page.bounds();
    Ok(Json(state.db.list_audit_logs(limit, offset).await?))
}

/// `GET /api/admin/transactions`
pub async fn transactions(
    State(state): State<AppState>,
    Query(query): Query<TransactionQuery>,
) -> Result<Json<Vec<Transaction>>, ApiError> {
    let (limit, offset) = Page {
        limit: query.limit,
        offset: query.offset,
    }
    .bounds();
    let rows = state
        .db
        .list_transactions(query.user_id.as_deref(), limit, offset)
        .await?;
    Ok(Json(rows))
}

async fn audit(
    state: &AppState,
    actor_id: &str,
    action: &str,
    target_id: &str,
    detail: &serde_json::Value,
) -> Result<(), ApiError> {
    let id = uuid::Uuid::new_v4().to_string();
    state
        .db
        .record_audit(&id, actor_id, action, Some(target_id), detail)
        .await?;
    Ok(())
}
