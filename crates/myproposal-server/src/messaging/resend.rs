//! Resend transactional email client.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{ChannelSender, MessagingError, OutboundMessage};
use crate::storage::Channel;

const RESEND_API_URL: &str = "https://api.resend.com";

#[derive(Debug, Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    html: Option<&'a str>,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct SendEmailResponse {
    id: String,
}

#[derive(Debug, Clone)]
pub struct ResendClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    from: String,
}

impl ResendClient {
    pub fn new(api_key: &str, from: &str, timeout: Duration) -> Result<Self, MessagingError> {
        Ok(Self {
            http: crate::http::build_client(timeout)?,
            base_url: RESEND_API_URL.to_string(),
            api_key: api_key.to_string(),
            from: from.to_string(),
        })
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl ChannelSender for ResendClient {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    #[instrument(skip_all)]
    async fn send(&self, message: &OutboundMessage) -> Result<String, MessagingError> {
        let body = SendEmailRequest {
            from: &self.from,
            to: [&message.to],
            subject: message.subject.as_deref().unwrap_or("A special message"),
            html: message.html.as_deref(),
            text: &message.text,
        };

        let resp = self
            .http
            .post(format!("{}/emails", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let (status, body) = crate::http::error_body(resp).await;
            return Err(MessagingError::Api {
                provider: "resend",
                status,
                body,
            });
        }

        let sent: SendEmailResponse = resp.json().await?;
        debug!(id = %sent.id, "Email accepted");
        Ok(sent.id)
    }
}
