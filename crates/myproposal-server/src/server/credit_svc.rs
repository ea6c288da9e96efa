//! Credit balance routes.

use axum::extract::State;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::error::ApiError;
use super::state::AppState;
use crate::auth::Claims;
use crate::credits::CreditCheck;

#[derive(Debug, Default, Deserialize)]
pub struct ConsumeRequest {
    /// Defaults to the generation cost.
    #[serde(default)]
    pub cost: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ConsumeResponse {
    pub remaining: i64,
}

/// `GET /api/credits`
#[instrument(skip_all, fields(user_id = %claims.sub))]
pub async fn check(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<CreditCheck>, ApiError> {
    Ok(Json(state.ledger.check_user_credits(&claims.sub).await?))
}

/// `POST /api/credits/consume`
#[instrument(skip_all, fields(user_id = %claims.sub))]
pub async fn consume(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    body: Option<Json<ConsumeRequest>>,
) -> Result<Json<ConsumeResponse>, ApiError> {
    let cost = body
        .and_then(|Json(req)| req.cost)
        .unwrap_or(state.ledger.policy().generation_cost);

    // Open a new period first if the old one ran out.
    state.ledger.check_user_credits(&claims.sub).await?;
    let remaining = state.ledger.consume_credit(&claims.sub, cost).await?;
    Ok(Json(ConsumeResponse { remaining }))
}
