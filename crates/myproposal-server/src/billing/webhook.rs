use myproposal_core::SubscriptionStatus;
use serde::Serialize;
use tracing::{info, instrument, warn};

use super::events::{self, CheckoutSession, Invoice, StripeEvent, Subscription};
use super::signature::{DEFAULT_TOLERANCE_SECS, verify_signature};
use super::{BillingError, PriceCatalog};
use crate::credits::{CreditLedger, SubscriptionChange};
use crate::storage::{AppDatabase, NewTransaction, TransactionKind, User};

/// What happened to a verified webhook event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum WebhookOutcome {
    Applied { event_type: String },
    Ignored { event_type: String, reason: String },
    Duplicate { event_id: String },
}

/// Verifies and applies Stripe webhook events.
#[derive(Clone)]
pub struct WebhookProcessor {
    db: AppDatabase,
    ledger: CreditLedger,
    prices: PriceCatalog,
    secret: String,
    tolerance_secs: i64,
}

impl WebhookProcessor {
    pub fn new(db: AppDatabase, ledger: CreditLedger, prices: PriceCatalog, secret: &str) -> Self {
        Self {
            db,
            ledger,
            prices,
            secret: secret.to_string(),
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
        }
    }

    /// Verify the signature, then apply the event at most once.
    ///
    /// A failed event is released again so Stripe's retry can reapply it.
    #[instrument(skip_all)]
    pub async fn handle(
        &self,
        payload: &[u8],
        signature_header: &str,
        now: i64,
    ) -> Result<WebhookOutcome, BillingError> {
        verify_signature(payload, signature_header, &self.secret, now, self.tolerance_secs)?;

        let event: StripeEvent = serde_json::from_slice(payload)
            .map_err(|e| BillingError::InvalidPayload(e.to_string()))?;

        if !self
            .db
            .mark_webhook_event_processed(&event.id, &event.event_type)
            .await?
        {
            info!(event_id = %event.id, "Webhook event already processed");
            return Ok(WebhookOutcome::Duplicate { event_id: event.id });
        }

        match self.apply(&event).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                warn!(event_id = %event.id, error = %e, "Webhook event failed, releasing claim");
                self.db.unmark_webhook_event(&event.id).await?;
                Err(e)
            }
        }
    }

    async fn apply(&self, event: &StripeEvent) -> Result<WebhookOutcome, BillingError> {
        let event_type = event.event_type.as_str();
        info!(event_id = %event.id, event_type, "Applying webhook event");

        let ignored = match event_type {
            events::CHECKOUT_COMPLETED => self.checkout_completed(parse(event)?).await?,
            events::SUBSCRIPTION_CREATED | events::SUBSCRIPTION_UPDATED => {
                self.subscription_changed(parse(event)?).await?
            }
            events::SUBSCRIPTION_DELETED => self.subscription_deleted(parse(event)?).await?,
            events::INVOICE_PAID => self.invoice(parse(event)?, true).await?,
            events::INVOICE_FAILED => self.invoice(parse(event)?, false).await?,
            _ => Some("unhandled event type".to_string()),
        };

        Ok(match ignored {
            None => WebhookOutcome::Applied {
                event_type: event_type.to_string(),
            },
            Some(reason) => {
                info!(event_type, %reason, "Webhook event ignored");
                WebhookOutcome::Ignored {
                    event_type: event_type.to_string(),
                    reason,
                }
            }
        })
    }

    /// Each handler returns `Some(reason)` when the event does not apply.
    async fn checkout_completed(
        &self,
        session: CheckoutSession,
    ) -> Result<Option<String>, BillingError> {
        let Some(user_id) = session.user_id() else {
            return Ok(Some("checkout session has no user reference".into()));
        };
        let Some(user) = self.find_user(user_id).await? else {
            return Ok(Some(format!("unknown user {user_id}")));
        };

        if let Some(customer) = session.customer.as_deref() {
            self.db
                .set_stripe_ids(&user.id, customer, session.subscription.as_deref())
                .await?;
        }
        self.record(
            &user.id,
            TransactionKind::Checkout,
            session.amount_total.unwrap_or_default(),
            session.currency.as_deref().unwrap_or("usd"),
            &session.id,
        )
        .await?;
        Ok(None)
    }

    async fn subscription_changed(
        &self,
        sub: Subscription,
    ) -> Result<Option<String>, BillingError> {
        let Some(user) = self.user_for_subscription(&sub).await? else {
            return Ok(Some(format!("no user for customer {}", sub.customer)));
        };
        let Some(tier) = sub.price_id().and_then(|p| self.prices.tier_for(p)) else {
            return Ok(Some("subscription price is not a known plan".into()));
        };

        if user.stripe_customer_id.as_deref() != Some(sub.customer.as_str()) {
            self.db.set_stripe_ids(&user.id, &sub.customer, Some(&sub.id)).await?;
        }

        let (period_start, period_end) = sub.period();
        self.ledger
            .apply_subscription(&SubscriptionChange {
                user_id: &user.id,
                tier,
                status: SubscriptionStatus::from_stripe(&sub.status),
                subscription_id: Some(&sub.id),
                period_start,
                period_end,
            })
            .await?;
        Ok(None)
    }

    async fn subscription_deleted(
        &self,
        sub: Subscription,
    ) -> Result<Option<String>, BillingError> {
        let Some(user) = self.user_for_subscription(&sub).await? else {
            return Ok(Some(format!("no user for customer {}", sub.customer)));
        };

        self.ledger.downgrade_to_free(&user.id).await?;
        self.record(&user.id, TransactionKind::SubscriptionCanceled, 0, "usd", &sub.id)
            .await?;
        Ok(None)
    }

    async fn invoice(&self, invoice: Invoice, paid: bool) -> Result<Option<String>, BillingError> {
        let Some(customer) = invoice.customer.as_deref() else {
            return Ok(Some("invoice has no customer".into()));
        };
        let Some(user) = self.db.get_user_by_stripe_customer(customer).await? else {
            return Ok(Some(format!("no user for customer {customer}")));
        };

        if paid {
            self.record(
                &user.id,
                TransactionKind::InvoicePaid,
                invoice.amount_paid,
                &invoice.currency,
                &invoice.id,
            )
            .await?;
        } else {
            self.db
                .set_subscription_status(&user.id, SubscriptionStatus::PastDue)
                .await?;
            self.record(
                &user.id,
                TransactionKind::InvoiceFailed,
                invoice.amount_due,
                &invoice.currency,
                &invoice.id,
            )
            .await?;
        }
        Ok(None)
    }

    async fn user_for_subscription(&self, sub: &Subscription) -> Result<Option<User>, BillingError> {
        if let Some(user_id) = sub.user_id() {
            if let Some(user) = self.find_user(user_id).await? {
                return Ok(Some(user));
            }
        }
        Ok(self.db.get_user_by_stripe_customer(&sub.customer).await?)
    }

    async fn find_user(&self, user_id: &str) -> Result<Option<User>, BillingError> {
        match self.db.get_user(user_id).await {
            Ok(user) => Ok(Some(user)),
            Err(crate::storage::DatabaseError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn record(
        &self,
        user_id: &str,
        kind: TransactionKind,
        amount_cents: i64,
        currency: &str,
        stripe_ref: &str,
    ) -> Result<(), BillingError> {
        let id = uuid::Uuid::new_v4().to_string();
        self.db
            .record_transaction(&NewTransaction {
                id: &id,
                user_id,
                kind,
                amount_cents,
                currency,
                stripe_ref: Some(stripe_ref),
            })
            .await?;
        Ok(())
    }
}

fn parse<T: serde::de::DeserializeOwned>(event: &StripeEvent) -> Result<T, BillingError> {
    serde_json::from_value(event.data.object.clone())
        .map_err(|e| BillingError::InvalidPayload(format!("{}: {e}", event.event_type)))
}
