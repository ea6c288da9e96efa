//! Scheduled maintenance endpoint, called by an external cron with a shared
//! bearer secret.

use axum::Json;
use axum::extract::{Request, State};
use myproposal_core::db::unix_timestamp;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{info, instrument, warn};

use super::error::ApiError;
use super::interceptor::bearer_token;
use super::state::AppState;
use crate::credits::ResetSummary;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CronReport {
    pub reset: ResetSummary,
    pub expired_proposals: u64,
}

/// `GET /api/cron/reset-credits`
#[instrument(skip_all)]
pub async fn reset_credits(
    State(state): State<AppState>,
    req: Request,
) -> Result<Json<CronReport>, ApiError> {
    let expected = state.cron_secret.as_deref().ok_or(ApiError::Unavailable("Cron"))?;
    let authorized = bearer_token(&req).is_some_and(|token| secrets_match(token, expected));
    if !authorized {
        warn!("Cron call with missing or wrong secret");
        return Err(ApiError::Unauthorized("Invalid cron secret"));
    }

    let report = run_maintenance(&state, unix_timestamp()).await?;
    Ok(Json(report))
}

/// Batch credit reset plus proposal expiry. Shared with the in-process
/// interval task.
pub async fn run_maintenance(state: &AppState, now: i64) -> Result<CronReport, ApiError> {
    let reset = state.ledger.reset_expired_allotments(now).await?;
    let expired_proposals = state.db.expire_overdue_proposals(now).await?;
    info!(reset = reset.total(), expired_proposals, "Maintenance run complete");
    Ok(CronReport {
        reset,
        expired_proposals,
    })
}

/// Compare digests so the comparison time does not depend on the secret.
fn secrets_match(given: &str, expected: &str) -> bool {
    Sha256::digest(given.as_bytes()) == Sha256::digest(expected.as_bytes())
}
