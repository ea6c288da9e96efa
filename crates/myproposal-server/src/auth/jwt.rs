//! JWT token issuance and validation.

use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use myproposal_core::db::unix_timestamp;
use sha2::{Digest, Sha256};

use super::claims::{self, Claims};
use crate::storage::User;

const OAUTH_STATE_TTL_SECS: i64 = 10 * 60;

/// Manages JWT token creation and validation.
#[derive(Clone)]
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
}

impl JwtManager {
    pub fn new(secret: &[u8], access_ttl_secs: i64, refresh_ttl_secs: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            access_ttl_secs,
            refresh_ttl_secs,
        }
    }

    /// Issue an access token for the given user. Returns the token and its
    /// lifetime in seconds.
    pub fn issue_access_token(
        &self,
        user: &User,
    ) -> Result<(String, i64), jsonwebtoken::errors::Error> {
        let token = self.encode(user, claims::ACCESS, self.access_ttl_secs)?;
        Ok((token, self.access_ttl_secs))
    }

    /// Issue a refresh token for the given user. Returns the token and its
    /// absolute expiry.
    pub fn issue_refresh_token(
        &self,
        user: &User,
    ) -> Result<(String, i64), jsonwebtoken::errors::Error> {
        let exp = unix_timestamp() + self.refresh_ttl_secs;
        let token = self.encode(user, claims::REFRESH, self.refresh_ttl_secs)?;
        Ok((token, exp))
    }

    /// Issue a short-lived, user-less token used as the OAuth `state`
    /// parameter.
    pub fn issue_oauth_state(&self) -> Result<String, jsonwebtoken::errors::Error> {
        let now = unix_timestamp();
        let claims = Claims {
            jti: uuid::Uuid::new_v4().to_string(),
            sub: String::new(),
            email: String::new(),
            role: crate::storage::Role::default(),
            tier: myproposal_core::SubscriptionTier::default(),
            subscription_status: myproposal_core::SubscriptionStatus::default(),
            iat: now,
            exp: now + OAUTH_STATE_TTL_SECS,
            token_type: claims::OAUTH_STATE.to_string(),
        };
        jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)
    }

    /// Validate a token and return its claims.
    pub fn validate(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let data =
            jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &Validation::default())?;
        Ok(data.claims)
    }

    /// Hash a token for storage (we don't store raw tokens).
    pub fn hash_token(token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn encode(
        &self,
        user: &User,
        token_type: &str,
        ttl_secs: i64,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let now = unix_timestamp();
        let claims = Claims {
            jti: uuid::Uuid::new_v4().to_string(),
            sub: user.id.clone(),
            email: user.email.clone(),
            role: user.role,
            tier: user.tier,
            subscription_status: user.subscription_status,
            iat: now,
            exp: now + ttl_secs,
            token_type: token_type.to_string(),
        };
        jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)
    }
}
