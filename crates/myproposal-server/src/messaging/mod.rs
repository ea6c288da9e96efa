//! Proposal delivery over email, SMS and WhatsApp.

mod dispatcher;
mod resend;
pub mod templates;
mod twilio;
pub mod validate;

use async_trait::async_trait;
use serde::Serialize;

use crate::storage::Channel;

pub use dispatcher::{Delivery, Dispatcher};
pub use resend::ResendClient;
pub use twilio::TwilioClient;

#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("Channel {0} is not configured")]
    ChannelUnavailable(Channel),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{provider} API error ({status}): {body}")]
    Api {
        provider: &'static str,
        status: u16,
        body: String,
    },
}

/// A rendered message ready for a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Email address or E.164 number.
    pub to: String,
    pub subject: Option<String>,
    pub html: Option<String>,
    pub text: String,
}

/// Provider acknowledgement of an accepted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryReceipt {
    pub channel: Channel,
    /// Provider message id.
    pub reference: String,
}

/// A provider able to deliver on one channel.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    fn channel(&self) -> Channel;

    /// Hand the message to the provider and return its message id.
    async fn send(&self, message: &OutboundMessage) -> Result<String, MessagingError>;
}
