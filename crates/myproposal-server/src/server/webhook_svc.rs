//! Stripe webhook endpoint.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use myproposal_core::db::unix_timestamp;

use super::error::ApiError;
use super::state::AppState;
use crate::billing::WebhookOutcome;

const SIGNATURE_HEADER: &str = "stripe-signature";

/// `POST /api/webhooks/stripe`
///
/// The raw body is needed for signature verification, so it is taken as
/// bytes rather than parsed JSON.
pub async fn stripe(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookOutcome>, ApiError> {
    let processor = state.webhooks.as_ref().ok_or(ApiError::Unavailable("Billing"))?;
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::bad_request("Missing Stripe-Signature header"))?;

    let outcome = processor.handle(&body, signature, unix_timestamp()).await?;
    Ok(Json(outcome))
}
