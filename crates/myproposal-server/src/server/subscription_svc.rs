//! Subscription routes: status, Stripe Checkout and cancellation.

use axum::extract::State;
use axum::{Extension, Json};
use myproposal_core::{SubscriptionStatus, SubscriptionTier};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use super::error::ApiError;
use super::state::AppState;
use crate::auth::Claims;
use crate::billing::CheckoutParams;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionView {
    pub tier: SubscriptionTier,
    pub status: SubscriptionStatus,
    pub remaining_credits: i64,
    pub current_period_start: Option<i64>,
    pub current_period_end: Option<i64>,
    pub has_stripe_subscription: bool,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub plan: SubscriptionTier,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub session_id: String,
    pub url: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub subscription_id: String,
    pub status: String,
    pub cancel_at_period_end: bool,
}

/// `GET /api/subscriptions`
pub async fn status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<SubscriptionView>, ApiError> {
    let user = state.db.get_user(&claims.sub).await?;
    Ok(Json(SubscriptionView {
        tier: user.tier,
        status: user.subscription_status,
        remaining_credits: user.remaining_credits,
        current_period_start: user.current_period_start,
        current_period_end: user.current_period_end,
        has_stripe_subscription: user.stripe_subscription_id.is_some(),
    }))
}

/// `POST /api/subscriptions`
///
/// The tier change itself arrives later through the webhook.
#[instrument(skip_all, fields(user_id = %claims.sub, plan = %req.plan))]
pub async fn checkout(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    if req.plan == SubscriptionTier::Free {
        return Err(ApiError::bad_request("plan must be PREMIUM or YEARLY"));
    }
    let stripe = state.stripe.as_ref().ok_or(ApiError::Unavailable("Billing"))?;
    let price_id = state
        .prices
        .price_for(req.plan)
        .ok_or(ApiError::Unavailable("Billing plan"))?;

    let user = state.db.get_user(&claims.sub).await?;
    let success_url = format!("{}/dashboard?checkout=success", state.app_url);
    let cancel_url = format!("{}/pricing?checkout=canceled", state.app_url);

    let session = stripe
        .create_checkout_session(&CheckoutParams {
            user_id: &user.id,
            email: &user.email,
            customer_id: user.stripe_customer_id.as_deref(),
            price_id,
            success_url: &success_url,
            cancel_url: &cancel_url,
        })
        .await?;

    info!(session_id = %session.id, "Checkout session created");
    Ok(Json(CheckoutResponse {
        session_id: session.id,
        url: session.url,
    }))
}

/// `POST /api/subscriptions/cancel`
#[instrument(skip_all, fields(user_id = %claims.sub))]
pub async fn cancel(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<CancelResponse>, ApiError> {
    let stripe = state.stripe.as_ref().ok_or(ApiError::Unavailable("Billing"))?;
    let user = state.db.get_user(&claims.sub).await?;
    let Some(subscription_id) = user.stripe_subscription_id.as_deref() else {
        return Err(ApiError::Conflict("No active subscription".into()));
    };

    let sub = stripe.cancel_at_period_end(subscription_id).await?;
    info!(subscription_id = %sub.id, "Subscription set to cancel at period end");
    Ok(Json(CancelResponse {
        subscription_id: sub.id,
        status: sub.status,
        cancel_at_period_end: sub.cancel_at_period_end,
    }))
}
