//! HTTP API for myproposal.

pub mod admin_svc;
pub mod auth_svc;
pub mod credit_svc;
pub mod cron_svc;
pub mod error;
pub mod health;
pub mod interceptor;
pub mod proposal_svc;
mod state;
pub mod subscription_svc;
pub mod webhook_svc;

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod test_helpers;

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod auth_svc_tests;

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod proposal_svc_tests;

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod admin_svc_tests;

use axum::Router;
use axum::http::HeaderValue;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

pub use error::ApiError;
pub use interceptor::{require_admin, require_auth};
pub use state::AppState;

const DEFAULT_PAGE_SIZE: u32 = 20;
const MAX_PAGE_SIZE: u32 = 100;

/// `?limit=&offset=` query parameters.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: Option<u32>,
}

impl Page {
    pub fn bounds(self) -> (u32, u32) {
        (
            self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
            self.offset.unwrap_or(0),
        )
    }
}

/// Build the full API router.
pub fn build_router(state: AppState) -> Router {
    let public = Router::new()
        .route("/health", get(health::health))
        .route("/api/auth/register", post(auth_svc::register))
        .route("/api/auth/login", post(auth_svc::login))
        .route("/api/auth/refresh", post(auth_svc::refresh))
        .route("/api/auth/logout", post(auth_svc::logout))
        .route("/api/auth/oauth/google", get(auth_svc::google_authorize))
        .route("/api/auth/oauth/google/callback", get(auth_svc::google_callback))
        .route("/api/public/proposals/{id}", get(proposal_svc::public_view))
        .route("/api/public/proposals/{id}/respond", post(proposal_svc::respond))
        .route(
            "/api/public/proposals/{id}/messages",
            post(proposal_svc::recipient_reply),
        )
        .route("/api/webhooks/stripe", post(webhook_svc::stripe))
        .route("/api/cron/reset-credits", get(cron_svc::reset_credits));

    let user = Router::new()
        .route("/api/me", get(auth_svc::me))
        .route("/api/proposals/generate", post(proposal_svc::generate))
        .route("/api/proposals/send", post(proposal_svc::send))
        .route(
            "/api/proposals",
            get(proposal_svc::list).post(proposal_svc::create),
        )
        .route(
            "/api/proposals/{id}",
            get(proposal_svc::get).put(proposal_svc::update),
        )
        .route("/api/proposals/{id}/messages", post(proposal_svc::sender_reply))
        .route("/api/credits", get(credit_svc::check))
        .route("/api/credits/consume", post(credit_svc::consume))
        .route(
            "/api/subscriptions",
            get(subscription_svc::status).post(subscription_svc::checkout),
        )
        .route("/api/subscriptions/cancel", post(subscription_svc::cancel))
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    // Layers run bottom-up: auth first, then the admin check.
    let admin = Router::new()
        .route("/api/admin/users", get(admin_svc::list_users))
        .route("/api/admin/users/{id}/credits", post(admin_svc::grant_credits))
        .route("/api/admin/users/{id}/role", post(admin_svc::set_role))
        .route("/api/admin/audit-logs", get(admin_svc::audit_logs))
        .route("/api/admin/transactions", get(admin_svc::transactions))
        .route_layer(from_fn_with_state(state.clone(), require_admin))
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    let cors = cors_layer(&state.app_url);

    public
        .merge(user)
        .merge(admin)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(app_url: &str) -> CorsLayer {
    let base = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    match HeaderValue::from_str(app_url) {
        Ok(origin) => base.allow_origin(origin),
        Err(e) => {
            warn!(app_url, error = %e, "APP_URL is not a valid origin, CORS disabled");
            base
        }
    }
}
