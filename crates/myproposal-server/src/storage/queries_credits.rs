//! Credit counter writes.
//!
//! Every statement here is a single conditional `UPDATE`, so concurrent
//! callers cannot interleave a read and a write. Only the credit ledger calls
//! these.

use myproposal_core::{SubscriptionStatus, SubscriptionTier};

use super::db::{AppDatabase, DatabaseError};

/// Subscription state written by the billing webhook path.
#[derive(Debug, Clone)]
pub struct SubscriptionWrite<'a> {
    pub user_id: &'a str,
    pub tier: SubscriptionTier,
    pub status: SubscriptionStatus,
    pub subscription_id: Option<&'a str>,
    pub period_start: Option<i64>,
    pub period_end: Option<i64>,
    /// `Some(n)` overwrites the balance with `n` and stamps the reset time.
    pub refill_to: Option<i64>,
}

impl AppDatabase {
    /// Refill the balance and open a new period, but only if the stored
    /// period has ended (or was never opened) as of `now`.
    ///
    /// Returns `true` when this call performed the reset.
    pub(crate) async fn reset_period_if_elapsed(
        &self,
        user_id: &str,
        allotment: i64,
        now: i64,
        period_end: i64,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE users SET remaining_credits = ?, current_period_start = ?, \
             current_period_end = ?, last_credit_reset = ?, updated_at = ? \
             WHERE id = ? AND (current_period_end IS NULL OR current_period_end < ?)",
        )
        .bind(allotment)
        .bind(now)
        .bind(period_end)
        .bind(now)
        .bind(now)
        .bind(user_id)
        .bind(now)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Compare-and-decrement: subtracts `cost` only when the balance covers
    /// it. `None` means the guard failed (or the user does not exist).
    pub(crate) async fn decrement_credits_guarded(
        &self,
        user_id: &str,
        cost: i64,
        now: i64,
    ) -> Result<Option<i64>, DatabaseError> {
        let remaining = sqlx::query_scalar::<_, i64>(
            "UPDATE users SET remaining_credits = remaining_credits - ?, updated_at = ? \
             WHERE id = ? AND remaining_credits >= ? RETURNING remaining_credits",
        )
        .bind(cost)
        .bind(now)
        .bind(user_id)
        .bind(cost)
        .fetch_optional(self.pool())
        .await?;

        Ok(remaining)
    }

    /// Decrement that may go negative. `cost` must be positive; the row is
    /// left untouched when the result would fall below `i64::MIN`.
    pub(crate) async fn decrement_credits_unguarded(
        &self,
        user_id: &str,
        cost: i64,
        now: i64,
    ) -> Result<Option<i64>, DatabaseError> {
        let remaining = sqlx::query_scalar::<_, i64>(
            "UPDATE users SET remaining_credits = remaining_credits - ?, updated_at = ? \
             WHERE id = ? AND remaining_credits >= ? RETURNING remaining_credits",
        )
        .bind(cost)
        .bind(now)
        .bind(user_id)
        .bind(i64::MIN.saturating_add(cost))
        .fetch_optional(self.pool())
        .await?;

        Ok(remaining)
    }

    /// Add a positive `amount`. `None` when the user does not exist or the
    /// result would exceed `i64::MAX`.
    pub(crate) async fn increment_credits(
        &self,
        user_id: &str,
        amount: i64,
        now: i64,
    ) -> Result<Option<i64>, DatabaseError> {
        let remaining = sqlx::query_scalar::<_, i64>(
            "UPDATE users SET remaining_credits = remaining_credits + ?, updated_at = ? \
             WHERE id = ? AND remaining_credits <= ? RETURNING remaining_credits",
        )
        .bind(amount)
        .bind(now)
        .bind(user_id)
        .bind(i64::MAX.saturating_sub(amount))
        .fetch_optional(self.pool())
        .await?;

        Ok(remaining)
    }

    pub(crate) async fn write_subscription_state(
        &self,
        update: &SubscriptionWrite<'_>,
        now: i64,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE users SET tier = ?, subscription_status = ?, \
             stripe_subscription_id = COALESCE(?, stripe_subscription_id), \
             current_period_start = COALESCE(?, current_period_start), \
             current_period_end = COALESCE(?, current_period_end), \
             remaining_credits = COALESCE(?, remaining_credits), \
             last_credit_reset = CASE WHEN ? IS NULL THEN last_credit_reset ELSE ? END, \
             updated_at = ? \
             WHERE id = ?",
        )
        .bind(update.tier)
        .bind(update.status)
        .bind(update.subscription_id)
        .bind(update.period_start)
        .bind(update.period_end)
        .bind(update.refill_to)
        .bind(update.refill_to)
        .bind(now)
        .bind(now)
        .bind(update.user_id)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Drop a user back to FREE with a fresh FREE balance.
    ///
    /// The current period is left open for a month from `now` so the next
    /// lazy check does not immediately refill again.
    pub(crate) async fn write_downgrade(
        &self,
        user_id: &str,
        allotment: i64,
        now: i64,
        period_end: i64,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE users SET tier = 'FREE', subscription_status = 'CANCELED', \
             stripe_subscription_id = NULL, remaining_credits = ?, \
             current_period_start = ?, current_period_end = ?, last_credit_reset = ?, \
             updated_at = ? WHERE id = ?",
        )
        .bind(allotment)
        .bind(now)
        .bind(period_end)
        .bind(now)
        .bind(now)
        .bind(user_id)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Batch refill for one tier: every user whose last reset is at or
    /// before `cutoff` gets `allotment`. Returns the number of users reset.
    pub(crate) async fn reset_tier_allotments(
        &self,
        tier: SubscriptionTier,
        allotment: i64,
        cutoff: i64,
        now: i64,
    ) -> Result<u64, DatabaseError> {
        let result = sqlx::query(
            "UPDATE users SET remaining_credits = ?, last_credit_reset = ?, updated_at = ? \
             WHERE tier = ? AND (last_credit_reset IS NULL OR last_credit_reset <= ?)",
        )
        .bind(allotment)
        .bind(now)
        .bind(now)
        .bind(tier)
        .bind(cutoff)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected())
    }
}
