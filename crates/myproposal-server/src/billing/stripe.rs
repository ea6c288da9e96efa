//! Minimal Stripe REST client: checkout sessions and subscription
//! cancellation.

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, instrument};

use super::BillingError;
use super::events::USER_ID_KEY;

const STRIPE_API_URL: &str = "https://api.stripe.com";

#[derive(Debug, Clone)]
pub struct CheckoutParams<'a> {
    pub user_id: &'a str,
    pub email: &'a str,
    /// Reuse an existing Stripe customer when the user already has one.
    pub customer_id: Option<&'a str>,
    pub price_id: &'a str,
    pub success_url: &'a str,
    pub cancel_url: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSessionCreated {
    pub id: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionResource {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub cancel_at_period_end: bool,
}

#[derive(Debug, Clone)]
pub struct StripeClient {
    http: reqwest::Client,
    base_url: String,
    secret_key: String,
}

impl StripeClient {
    pub fn new(secret_key: &str, timeout: Duration) -> Result<Self, BillingError> {
        Ok(Self {
            http: crate::http::build_client(timeout)?,
            base_url: STRIPE_API_URL.to_string(),
            secret_key: secret_key.to_string(),
        })
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Create a subscription-mode Checkout session for one price.
    #[instrument(skip(self, params), fields(user_id = %params.user_id))]
    pub async fn create_checkout_session(
        &self,
        params: &CheckoutParams<'_>,
    ) -> Result<CheckoutSessionCreated, BillingError> {
        let metadata_key = format!("metadata[{USER_ID_KEY}]");
        let sub_metadata_key = format!("subscription_data[metadata][{USER_ID_KEY}]");

        let mut form: Vec<(&str, &str)> = vec![
            ("mode", "subscription"),
            ("line_items[0][price]", params.price_id),
            ("line_items[0][quantity]", "1"),
            ("success_url", params.success_url),
            ("cancel_url", params.cancel_url),
            ("client_reference_id", params.user_id),
            (metadata_key.as_str(), params.user_id),
            (sub_metadata_key.as_str(), params.user_id),
        ];
        match params.customer_id {
            Some(customer) => form.push(("customer", customer)),
            None => form.push(("customer_email", params.email)),
        }

        let resp = self
            .http
            .post(format!("{}/v1/checkout/sessions", self.base_url))
            .bearer_auth(&self.secret_key)
            .form(&form)
            .send()
            .await?;
        let session: CheckoutSessionCreated = Self::check_status(resp).await?.json().await?;

        debug!(session_id = %session.id, "Checkout session created");
        Ok(session)
    }

    /// Schedule a subscription to end at the close of its current period.
    #[instrument(skip(self))]
    pub async fn cancel_at_period_end(
        &self,
        subscription_id: &str,
    ) -> Result<SubscriptionResource, BillingError> {
        let resp = self
            .http
            .post(format!("{}/v1/subscriptions/{subscription_id}", self.base_url))
            .bearer_auth(&self.secret_key)
            .form(&[("cancel_at_period_end", "true")])
            .send()
            .await?;
        let sub: SubscriptionResource = Self::check_status(resp).await?.json().await?;

        debug!(status = %sub.status, "Subscription set to cancel at period end");
        Ok(sub)
    }

    async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, BillingError> {
        if resp.status().is_success() {
            return Ok(resp);
        }
        let (status, body) = crate::http::error_body(resp).await;
        Err(BillingError::Api { status, body })
    }
}
