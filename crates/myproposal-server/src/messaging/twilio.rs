//! Twilio Messages API client, used for both SMS and WhatsApp.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::{ChannelSender, MessagingError, OutboundMessage};
use crate::storage::Channel;

const TWILIO_API_URL: &str = "https://api.twilio.com/2010-04-01";
const WHATSAPP_PREFIX: &str = "whatsapp:";

#[derive(Debug, Deserialize)]
struct MessageResource {
    sid: String,
}

/// One sending number on one channel. WhatsApp addresses get the
/// `whatsapp:` prefix on both ends.
#[derive(Debug, Clone)]
pub struct TwilioClient {
    http: reqwest::Client,
    base_url: String,
    account_sid: String,
    auth_token: String,
    from: String,
    channel: Channel,
}

impl TwilioClient {
    pub fn sms(
        account_sid: &str,
        auth_token: &str,
        from: &str,
        timeout: Duration,
    ) -> Result<Self, MessagingError> {
        Self::new(account_sid, auth_token, from, Channel::Sms, timeout)
    }

    pub fn whatsapp(
        account_sid: &str,
        auth_token: &str,
        from: &str,
        timeout: Duration,
    ) -> Result<Self, MessagingError> {
        Self::new(account_sid, auth_token, from, Channel::Whatsapp, timeout)
    }

    fn new(
        account_sid: &str,
        auth_token: &str,
        from: &str,
        channel: Channel,
        timeout: Duration,
    ) -> Result<Self, MessagingError> {
        Ok(Self {
            http: crate::http::build_client(timeout)?,
            base_url: TWILIO_API_URL.to_string(),
            account_sid: account_sid.to_string(),
            auth_token: auth_token.to_string(),
            from: from.to_string(),
            channel,
        })
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn address(&self, number: &str) -> String {
        match self.channel {
            Channel::Whatsapp if !number.starts_with(WHATSAPP_PREFIX) => {
                format!("{WHATSAPP_PREFIX}{number}")
            }
            _ => number.to_string(),
        }
    }
}

#[async_trait]
impl ChannelSender for TwilioClient {
    fn channel(&self) -> Channel {
        self.channel
    }

    #[instrument(skip_all, fields(channel = %self.channel))]
    async fn send(&self, message: &OutboundMessage) -> Result<String, MessagingError> {
        let to = self.address(&message.to);
        let from = self.address(&self.from);

        let resp = self
            .http
            .post(format!(
                "{}/Accounts/{}/Messages.json",
                self.base_url, self.account_sid
            ))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("To", to.as_str()), ("From", from.as_str()), ("Body", message.text.as_str())])
            .send()
            .await?;

        if !resp.status().is_success() {
            let (status, body) = crate::http::error_body(resp).await;
            return Err(MessagingError::Api {
                provider: "twilio",
                status,
                body,
            });
        }

        let created: MessageResource = resp.json().await?;
        debug!(sid = %created.sid, "Message queued");
        Ok(created.sid)
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn message() -> OutboundMessage {
        OutboundMessage {
            to: "+14155552671".into(),
            subject: None,
            html: None,
            text: "Will you?".into(),
        }
    }

    #[tokio::test]
    async fn sms_posts_form_to_account() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/Accounts/AC123/Messages.json"))
            .and(header_exists("authorization"))
            .and(body_string_contains("To=%2B14155552671"))
            .and(body_string_contains("From=%2B15005550006"))
            .and(body_string_contains("Body=Will+you%3F"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"sid": "SM1"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = TwilioClient::sms("AC123", "tok", "+15005550006", Duration::from_secs(5))
            .unwrap()
            .with_base_url(&server.uri());
        assert_eq!(client.channel(), Channel::Sms);
        assert_eq!(client.send(&message()).await.unwrap(), "SM1");
    }

    #[tokio::test]
    async fn whatsapp_prefixes_addresses() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("To=whatsapp%3A%2B14155552671"))
            .and(body_string_contains("From=whatsapp%3A%2B14155238886"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"sid": "SM2"})))
            .expect(1)
            .mount(&server)
            .await;

        let client =
            TwilioClient::whatsapp("AC123", "tok", "whatsapp:+14155238886", Duration::from_secs(5))
                .unwrap()
                .with_base_url(&server.uri());
        assert_eq!(client.send(&message()).await.unwrap(), "SM2");
    }

    #[tokio::test]
    async fn twilio_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid To number"))
            .mount(&server)
            .await;

        let client = TwilioClient::sms("AC123", "tok", "+15005550006", Duration::from_secs(5))
            .unwrap()
            .with_base_url(&server.uri());
        let err = client.send(&message()).await.unwrap_err();
        assert!(matches!(err, MessagingError::Api { status: 400, .. }));
    }
}
