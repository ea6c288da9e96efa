use myproposal_core::config::CreditPolicy;
use myproposal_core::db::unix_timestamp;
use myproposal_core::{SubscriptionStatus, SubscriptionTier};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::period::one_month_after;
use crate::storage::queries_credits::SubscriptionWrite;
use crate::storage::{AppDatabase, DatabaseError, User};

/// Largest single credit change, in either direction.
pub const MAX_CREDIT_DELTA: i64 = 1_000_000;

#[derive(Debug, thiserror::Error)]
pub enum CreditError {
    #[error("User {0} not found")]
    UserNotFound(String),

    #[error("Insufficient credits ({remaining} remaining)")]
    InsufficientCredits { remaining: i64 },

    #[error("Credit amount must be between 1 and {MAX_CREDIT_DELTA}, got {0}")]
    InvalidAmount(i64),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Result of [`CreditLedger::check_user_credits`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditCheck {
    pub allowed: bool,
    pub remaining: i64,
    pub tier: SubscriptionTier,
    pub period_end: Option<i64>,
    /// Whether this check refilled the balance.
    pub reset: bool,
}

/// Subscription state reported by the payment processor.
#[derive(Debug, Clone)]
pub struct SubscriptionChange<'a> {
    pub user_id: &'a str,
    pub tier: SubscriptionTier,
    pub status: SubscriptionStatus,
    pub subscription_id: Option<&'a str>,
    pub period_start: Option<i64>,
    pub period_end: Option<i64>,
}

/// Users refilled by one scheduled batch reset, per tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResetSummary {
    pub free: u64,
    pub premium: u64,
    pub yearly: u64,
}

impl ResetSummary {
    pub const fn total(&self) -> u64 {
        self.free + self.premium + self.yearly
    }
}

/// Reads and mutates credit balances under a [`CreditPolicy`].
#[derive(Clone)]
pub struct CreditLedger {
    db: AppDatabase,
    policy: CreditPolicy,
}

impl CreditLedger {
    pub const fn new(db: AppDatabase, policy: CreditPolicy) -> Self {
        Self { db, policy }
    }

    pub const fn policy(&self) -> &CreditPolicy {
        &self.policy
    }

    /// Check whether the user may spend a credit, refilling the balance
    /// first if the current period has ended.
    ///
    /// Users with an active Stripe subscription are never refilled here;
    /// their periods and refills come from [`Self::apply_subscription`].
    pub async fn check_user_credits(&self, user_id: &str) -> Result<CreditCheck, CreditError> {
        self.check_user_credits_at(user_id, unix_timestamp()).await
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn check_user_credits_at(
        &self,
        user_id: &str,
        now: i64,
    ) -> Result<CreditCheck, CreditError> {
        let mut user = self.load_user(user_id).await?;
        let mut reset = false;

        let billed_by_stripe = user.tier.is_paid()
            && user.subscription_status == SubscriptionStatus::Active
            && user.stripe_subscription_id.is_some();

        if !billed_by_stripe && user.current_period_end.is_none_or(|end| now > end) {
            let allotment = self.policy.allotment(user.tier);
            reset = self
                .db
                .reset_period_if_elapsed(user_id, allotment, now, one_month_after(now))
                .await?;

            if reset {
                info!(tier = %user.tier, allotment, "Credit period elapsed, balance refilled");
                #[cfg(feature = "metrics")]
                myproposal_core::metrics::record_credit_resets(1, "lazy");
            }
            // Reload either way: a concurrent check may have done the reset.
            user = self.load_user(user_id).await?;
        }

        Ok(CreditCheck {
            allowed: user.remaining_credits > 0,
            remaining: user.remaining_credits,
            tier: user.tier,
            period_end: user.current_period_end,
            reset,
        })
    }

    /// Take `cost` credits and return the new balance.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn consume_credit(&self, user_id: &str, cost: i64) -> Result<i64, CreditError> {
        validate_delta(cost)?;
        let now = unix_timestamp();

        let remaining = if self.policy.allow_overdraft {
            self.db.decrement_credits_unguarded(user_id, cost, now).await?
        } else {
            self.db.decrement_credits_guarded(user_id, cost, now).await?
        };

        let Some(remaining) = remaining else {
            let user = self.load_user(user_id).await?;
            debug!(remaining = user.remaining_credits, cost, "Credit consumption refused");
            return Err(CreditError::InsufficientCredits {
                remaining: user.remaining_credits,
            });
        };

        if remaining < 0 {
            warn!(remaining, "Credit balance overdrawn");
        }
        #[cfg(feature = "metrics")]
        myproposal_core::metrics::record_credits_consumed(cost.unsigned_abs());

        Ok(remaining)
    }

    /// Give back credits taken for an action that then failed.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn refund_credit(&self, user_id: &str, cost: i64) -> Result<i64, CreditError> {
        let remaining = self.increment(user_id, cost).await?;
        info!(cost, remaining, "Credit refunded");
        Ok(remaining)
    }

    /// Administrative top-up.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn grant_credits(&self, user_id: &str, amount: i64) -> Result<i64, CreditError> {
        let remaining = self.increment(user_id, amount).await?;
        info!(amount, remaining, "Credits granted");
        Ok(remaining)
    }

    /// Overwrite subscription state from the payment processor.
    ///
    /// The balance is refilled to the new tier's allotment when the
    /// subscription is active and either the tier changed or a new billing
    /// period started. Returns whether the balance was refilled.
    #[instrument(skip(self, change), fields(user_id = %change.user_id, tier = %change.tier))]
    pub async fn apply_subscription(
        &self,
        change: &SubscriptionChange<'_>,
    ) -> Result<bool, CreditError> {
        let user = self.load_user(change.user_id).await?;

        let new_period = change
            .period_start
            .is_some_and(|start| Some(start) != user.current_period_start);
        let refill = change.status == SubscriptionStatus::Active
            && (user.tier != change.tier || new_period);
        let refill_to = refill.then(|| self.policy.allotment(change.tier));

        self.db
            .write_subscription_state(
                &SubscriptionWrite {
                    user_id: change.user_id,
                    tier: change.tier,
                    status: change.status,
                    subscription_id: change.subscription_id,
                    period_start: change.period_start,
                    period_end: change.period_end,
                    refill_to,
                },
                unix_timestamp(),
            )
            .await?;

        info!(status = %change.status, refilled = refill, "Subscription state applied");
        #[cfg(feature = "metrics")]
        {
            if refill {
                myproposal_core::metrics::record_credit_resets(1, "webhook");
            }
        }

        Ok(refill)
    }

    /// Drop a user to FREE with the FREE allotment.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn downgrade_to_free(&self, user_id: &str) -> Result<(), CreditError> {
        let now = unix_timestamp();
        let allotment = self.policy.allotment(SubscriptionTier::Free);

        let updated = self
            .db
            .write_downgrade(user_id, allotment, now, one_month_after(now))
            .await?;
        if !updated {
            return Err(CreditError::UserNotFound(user_id.to_string()));
        }

        info!(allotment, "User downgraded to FREE");
        #[cfg(feature = "metrics")]
        myproposal_core::metrics::record_credit_resets(1, "webhook");
        Ok(())
    }

    /// Scheduled batch refill: every user whose last reset is older than
    /// their tier's interval gets the tier allotment.
    #[instrument(skip(self))]
    pub async fn reset_expired_allotments(&self, now: i64) -> Result<ResetSummary, CreditError> {
        let mut summary = ResetSummary::default();

        for tier in SubscriptionTier::ALL {
            let cutoff = now - self.policy.reset_interval_secs(tier);
            let count = self
                .db
                .reset_tier_allotments(tier, self.policy.allotment(tier), cutoff, now)
                .await?;

            match tier {
                SubscriptionTier::Free => summary.free = count,
                SubscriptionTier::Premium => summary.premium = count,
                SubscriptionTier::Yearly => summary.yearly = count,
            }
        }

        info!(
            free = summary.free,
            premium = summary.premium,
            yearly = summary.yearly,
            "Scheduled credit reset complete"
        );
        #[cfg(feature = "metrics")]
        myproposal_core::metrics::record_credit_resets(summary.total(), "cron");

        Ok(summary)
    }

    async fn increment(&self, user_id: &str, amount: i64) -> Result<i64, CreditError> {
        validate_delta(amount)?;
        match self
            .db
            .increment_credits(user_id, amount, unix_timestamp())
            .await?
        {
            Some(remaining) => Ok(remaining),
            None => {
                let user = self.load_user(user_id).await?;
                // The user exists, so the balance would leave the i64 range.
                warn!(remaining = user.remaining_credits, amount, "Credit increment refused");
                Err(CreditError::InvalidAmount(amount))
            }
        }
    }

    async fn load_user(&self, user_id: &str) -> Result<User, CreditError> {
        match self.db.get_user(user_id).await {
            Ok(user) => Ok(user),
            Err(DatabaseError::NotFound(_)) => Err(CreditError::UserNotFound(user_id.to_string())),
            Err(e) => Err(e.into()),
        }
    }
}

const fn validate_delta(amount: i64) -> Result<(), CreditError> {
    if amount <= 0 || amount > MAX_CREDIT_DELTA {
        return Err(CreditError::InvalidAmount(amount));
    }
    Ok(())
}
