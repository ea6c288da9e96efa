//! HTTP error type: every subsystem error ends up here.
//!
//! Client-facing messages are fixed strings or validated-input messages.
//! Anything internal is logged and replaced by a generic message.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::{error, warn};

use crate::auth::OAuthError;
use crate::billing::BillingError;
use crate::credits::CreditError;
use crate::generation::GenerationError;
use crate::messaging::MessagingError;
use crate::storage::DatabaseError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(&'static str),

    #[error("Insufficient credits")]
    InsufficientCredits { remaining: i64 },

    #[error("Forbidden")]
    Forbidden,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Proposal has expired")]
    Expired,

    #[error("Upstream provider failed: {0}")]
    Upstream(String),

    #[error("{0} is not configured")]
    Unavailable(&'static str),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::InsufficientCredits { .. } => StatusCode::PAYMENT_REQUIRED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Expired => StatusCode::GONE,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(err: impl std::fmt::Display) -> Self {
        Self::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::Internal(detail) => {
                error!(error = %detail, "Request failed");
                json!({ "error": "Internal server error" })
            }
            Self::Upstream(detail) => {
                warn!(error = %detail, "Upstream provider failed");
                json!({ "error": "Upstream provider failed" })
            }
            Self::InsufficientCredits { remaining } => {
                json!({ "error": self.to_string(), "remaining": remaining })
            }
            _ => json!({ "error": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

impl From<DatabaseError> for ApiError {
    fn from(e: DatabaseError) -> Self {
        match e {
            DatabaseError::NotFound(what) => Self::NotFound(format!("{what} not found")),
            DatabaseError::Conflict(_) => Self::Conflict("Resource already exists".into()),
            other => Self::internal(other),
        }
    }
}

impl From<CreditError> for ApiError {
    fn from(e: CreditError) -> Self {
        match e {
            CreditError::UserNotFound(_) => Self::NotFound("User not found".into()),
            CreditError::InsufficientCredits { remaining } => Self::InsufficientCredits { remaining },
            CreditError::InvalidAmount(n) => Self::BadRequest(format!("Invalid credit amount {n}")),
            CreditError::Database(db) => db.into(),
        }
    }
}

impl From<GenerationError> for ApiError {
    fn from(e: GenerationError) -> Self {
        match e {
            GenerationError::InvalidInput(msg) => Self::BadRequest(msg),
            GenerationError::ProviderUnavailable(_) => Self::Unavailable("AI provider"),
            upstream => Self::Upstream(upstream.to_string()),
        }
    }
}

impl From<MessagingError> for ApiError {
    fn from(e: MessagingError) -> Self {
        match e {
            MessagingError::InvalidRecipient(msg) => Self::BadRequest(msg),
            MessagingError::ChannelUnavailable(_) => Self::Unavailable("Delivery channel"),
            upstream => Self::Upstream(upstream.to_string()),
        }
    }
}

impl From<BillingError> for ApiError {
    fn from(e: BillingError) -> Self {
        match e {
            BillingError::Signature(_) => Self::BadRequest("Invalid webhook signature".into()),
            BillingError::InvalidPayload(_) => Self::BadRequest("Invalid webhook payload".into()),
            BillingError::Http(_) | BillingError::Api { .. } => Self::Upstream(e.to_string()),
            BillingError::Credit(c) => c.into(),
            BillingError::Database(db) => db.into(),
        }
    }
}

impl From<OAuthError> for ApiError {
    fn from(e: OAuthError) -> Self {
        match e {
            OAuthError::UnverifiedEmail => Self::Unauthorized("Google account email is not verified"),
            OAuthError::Url(_) => Self::internal(e),
            upstream => Self::Upstream(upstream.to_string()),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for ApiError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        Self::internal(format!("token encoding failed: {e}"))
    }
}
