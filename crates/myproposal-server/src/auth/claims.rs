//! JWT claims structure for myproposal auth.

use myproposal_core::{SubscriptionStatus, SubscriptionTier};
use serde::{Deserialize, Serialize};

use crate::storage::Role;

pub const ACCESS: &str = "access";
pub const REFRESH: &str = "refresh";
pub const OAUTH_STATE: &str = "oauth_state";

/// JWT claims embedded in issued tokens.
///
/// Access tokens carry the subscription fields so clients can render plan
/// state without another round trip; they are refreshed on token rotation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// JWT ID (unique per token).
    pub jti: String,
    /// Subject (user ID). Empty for OAuth state tokens.
    pub sub: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub tier: SubscriptionTier,
    #[serde(default)]
    pub subscription_status: SubscriptionStatus,
    pub iat: i64,
    pub exp: i64,
    /// `access`, `refresh` or `oauth_state`.
    pub token_type: String,
}

impl Claims {
    pub fn is_access(&self) -> bool {
        self.token_type == ACCESS
    }

    pub fn is_refresh(&self) -> bool {
        self.token_type == REFRESH
    }

    pub fn is_oauth_state(&self) -> bool {
        self.token_type == OAUTH_STATE
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}
