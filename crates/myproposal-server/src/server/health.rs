//! Liveness endpoint for load balancers and uptime checks.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Serialize;
use tracing::warn;

use super::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub version: &'static str,
    pub database: bool,
}

/// `GET /health`
///
/// 200 while the database answers, 503 otherwise.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthStatus>) {
    let database = match sqlx::query("SELECT 1").execute(state.db.pool()).await {
        Ok(_) => true,
        Err(e) => {
            warn!(error = %e, "Health check database probe failed");
            false
        }
    };

    let (code, status) = if database {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };
    (
        code,
        Json(HealthStatus {
            status,
            version: env!("CARGO_PKG_VERSION"),
            database,
        }),
    )
}
