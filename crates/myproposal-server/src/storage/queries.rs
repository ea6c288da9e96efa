//! User and token queries.

use myproposal_core::SubscriptionStatus;
use myproposal_core::db::unix_timestamp;

use super::db::{AppDatabase, DatabaseError};
use super::models::{Role, Token, User};

/// Parameters for [`AppDatabase::create_user`].
#[derive(Debug, Clone, Default)]
pub struct NewUser<'a> {
    pub id: &'a str,
    pub email: &'a str,
    pub name: Option<&'a str>,
    pub password_hash: Option<&'a str>,
    pub oauth_provider: Option<&'a str>,
    pub oauth_subject: Option<&'a str>,
    /// Starting balance; the FREE allotment for a fresh sign-up.
    pub initial_credits: i64,
}

impl AppDatabase {
    // =========================================================================
    // User queries
    // =========================================================================

    /// Create a new user on the FREE tier.
    ///
    /// The first credit period is left unset, so the first credit check
    /// opens it.
    pub async fn create_user(&self, params: &NewUser<'_>) -> Result<User, DatabaseError> {
        let now = unix_timestamp();

        sqlx::query(
            "INSERT INTO users (id, email, name, password_hash, oauth_provider, oauth_subject, \
             remaining_credits, last_credit_reset, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(params.id)
        .bind(params.email)
        .bind(params.name)
        .bind(params.password_hash)
        .bind(params.oauth_provider)
        .bind(params.oauth_subject)
        .bind(params.initial_credits)
        .bind(now)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;

        self.get_user(params.id).await
    }

    /// Get a user by ID.
    pub async fn get_user(&self, id: &str) -> Result<User, DatabaseError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("User {id}")))
    }

    /// Get a user by email (case-insensitive).
    pub async fn get_user_by_email(&self, email: &str) -> Result<User, DatabaseError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ? COLLATE NOCASE")
            .bind(email)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("User with email {email}")))
    }

    /// Get a user by linked OAuth identity.
    pub async fn get_user_by_oauth(
        &self,
        provider: &str,
        subject: &str,
    ) -> Result<Option<User>, DatabaseError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE oauth_provider = ? AND oauth_subject = ?",
        )
        .bind(provider)
        .bind(subject)
        .fetch_optional(self.pool())
        .await?;

        Ok(user)
    }

    /// Get a user by Stripe customer id.
    pub async fn get_user_by_stripe_customer(
        &self,
        customer_id: &str,
    ) -> Result<Option<User>, DatabaseError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE stripe_customer_id = ?")
            .bind(customer_id)
            .fetch_optional(self.pool())
            .await?;

        Ok(user)
    }

    /// Attach an OAuth identity to an existing (credentials) account.
    pub async fn link_oauth_identity(
        &self,
        user_id: &str,
        provider: &str,
        subject: &str,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "UPDATE users SET oauth_provider = ?, oauth_subject = ?, updated_at = ? WHERE id = ?",
        )
        .bind(provider)
        .bind(subject)
        .bind(unix_timestamp())
        .bind(user_id)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Record the Stripe customer (and optionally subscription) for a user.
    pub async fn set_stripe_ids(
        &self,
        user_id: &str,
        customer_id: &str,
        subscription_id: Option<&str>,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE users SET stripe_customer_id = ?, \
             stripe_subscription_id = COALESCE(?, stripe_subscription_id), updated_at = ? \
             WHERE id = ?",
        )
        .bind(customer_id)
        .bind(subscription_id)
        .bind(unix_timestamp())
        .bind(user_id)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Update only the subscription status (e.g. failed invoice).
    pub async fn set_subscription_status(
        &self,
        user_id: &str,
        status: SubscriptionStatus,
    ) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE users SET subscription_status = ?, updated_at = ? WHERE id = ?")
            .bind(status)
            .bind(unix_timestamp())
            .bind(user_id)
            .execute(self.pool())
            .await?;

        Ok(())
    }

    /// Change a user's role.
    pub async fn set_role(&self, user_id: &str, role: Role) -> Result<bool, DatabaseError> {
        let result = sqlx::query("UPDATE users SET role = ?, updated_at = ? WHERE id = ?")
            .bind(role)
            .bind(unix_timestamp())
            .bind(user_id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// List users, newest first.
    pub async fn list_users(&self, limit: u32, offset: u32) -> Result<Vec<User>, DatabaseError> {
        let users = sqlx::query_as::<_, User>(
            "SELECT * FROM users ORDER BY created_at DESC, id LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool())
        .await?;

        Ok(users)
    }

    pub async fn count_users(&self) -> Result<i64, DatabaseError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(self.pool())
            .await?;
        Ok(row.0)
    }

    // =========================================================================
    // Token queries
    // =========================================================================

    /// Store a refresh token.
    pub async fn create_token(
        &self,
        id: &str,
        user_id: &str,
        token_hash: &str,
        expires_at: i64,
    ) -> Result<Token, DatabaseError> {
        let now = unix_timestamp();

        sqlx::query(
            "INSERT INTO tokens (id, user_id, token_hash, expires_at, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(user_id)
        .bind(token_hash)
        .bind(expires_at)
        .bind(now)
        .execute(self.pool())
        .await?;

        self.get_token(id).await
    }

    /// Get a token by ID.
    pub async fn get_token(&self, id: &str) -> Result<Token, DatabaseError> {
        sqlx::query_as::<_, Token>("SELECT * FROM tokens WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Token {id}")))
    }

    /// Find a valid (non-revoked, non-expired) token by hash.
    pub async fn get_token_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<Token>, DatabaseError> {
        let now = unix_timestamp();

        let token = sqlx::query_as::<_, Token>(
            "SELECT * FROM tokens WHERE token_hash = ? AND revoked = 0 AND expires_at > ?",
        )
        .bind(token_hash)
        .bind(now)
        .fetch_optional(self.pool())
        .await?;

        Ok(token)
    }

    /// Revoke a token by ID.
    ///
    /// Only flips a live token, so two concurrent rotations of the same
    /// refresh token cannot both succeed.
    pub async fn revoke_token(&self, id: &str) -> Result<bool, DatabaseError> {
        let result = sqlx::query("UPDATE tokens SET revoked = 1 WHERE id = ? AND revoked = 0")
            .bind(id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Revoke all tokens for a user.
    pub async fn revoke_user_tokens(&self, user_id: &str) -> Result<u64, DatabaseError> {
        let result = sqlx::query("UPDATE tokens SET revoked = 1 WHERE user_id = ? AND revoked = 0")
            .bind(user_id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected())
    }
}
