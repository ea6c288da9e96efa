//! Stripe billing: checkout, cancellation and webhook processing.

pub mod events;
pub mod signature;
mod stripe;
mod webhook;


use myproposal_core::SubscriptionTier;

use crate::credits::CreditError;
use crate::storage::DatabaseError;

pub use signature::{SignatureError, sign_payload, verify_signature};
pub use stripe::{CheckoutParams, CheckoutSessionCreated, StripeClient, SubscriptionResource};
pub use webhook::{WebhookOutcome, WebhookProcessor};

#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("Invalid webhook signature: {0}")]
    Signature(#[from] SignatureError),

    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Stripe API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error(transparent)]
    Credit(#[from] CreditError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Stripe price ids for the paid tiers.
#[derive(Debug, Clone, Default)]
pub struct PriceCatalog {
    pub premium_price_id: Option<String>,
    pub yearly_price_id: Option<String>,
}

impl PriceCatalog {
    pub fn tier_for(&self, price_id: &str) -> Option<SubscriptionTier> {
        if self.premium_price_id.as_deref() == Some(price_id) {
            Some(SubscriptionTier::Premium)
        } else if self.yearly_price_id.as_deref() == Some(price_id) {
            Some(SubscriptionTier::Yearly)
        } else {
            None
        }
    }

    pub fn price_for(&self, tier: SubscriptionTier) -> Option<&str> {
        match tier {
            SubscriptionTier::Free => None,
            SubscriptionTier::Premium => self.premium_price_id.as_deref(),
            SubscriptionTier::Yearly => self.yearly_price_id.as_deref(),
        }
    }
}
