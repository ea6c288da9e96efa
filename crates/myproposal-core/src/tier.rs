//! Subscription tier and status types.
//!
//! Stored as upper-case TEXT columns and serialized the same way on the wire.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Subscription level determining credit allotment and reset interval.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionTier {
    #[default]
    Free,
    Premium,
    Yearly,
}

impl SubscriptionTier {
    pub const ALL: [Self; 3] = [Self::Free, Self::Premium, Self::Yearly];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Free => "FREE",
            Self::Premium => "PREMIUM",
            Self::Yearly => "YEARLY",
        }
    }

    /// Paid tiers are backed by a payment-processor subscription.
    pub const fn is_paid(self) -> bool {
        !matches!(self, Self::Free)
    }
}

impl fmt::Display for SubscriptionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionTier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "FREE" => Ok(Self::Free),
            "PREMIUM" => Ok(Self::Premium),
            "YEARLY" => Ok(Self::Yearly),
            _ => Err(Error::InvalidValue {
                field: "tier",
                value: s.to_string(),
            }),
        }
    }
}

/// Lifecycle state of the payment-processor subscription.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionStatus {
    #[default]
    Inactive,
    Active,
    PastDue,
    Canceled,
}

impl SubscriptionStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inactive => "INACTIVE",
            Self::Active => "ACTIVE",
            Self::PastDue => "PAST_DUE",
            Self::Canceled => "CANCELED",
        }
    }

    /// Map a Stripe subscription `status` string.
    ///
    /// `trialing` counts as active; `unpaid` and `incomplete` are treated as
    /// past due; anything unknown is inactive.
    pub fn from_stripe(status: &str) -> Self {
        match status {
            "active" | "trialing" => Self::Active,
            "past_due" | "unpaid" | "incomplete" => Self::PastDue,
            "canceled" | "incomplete_expired" => Self::Canceled,
            _ => Self::Inactive,
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
