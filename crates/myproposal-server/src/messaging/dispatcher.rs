use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, instrument, warn};

use super::templates::{email_html, email_subject, email_text, proposal_link, sms_body};
use super::validate::{is_valid_e164, is_valid_email};
use super::{ChannelSender, DeliveryReceipt, MessagingError, OutboundMessage};
use crate::storage::Channel;

/// What to deliver and to whom.
#[derive(Debug, Clone)]
pub struct Delivery<'a> {
    pub proposal_id: &'a str,
    pub sender_name: Option<&'a str>,
    pub recipient_name: &'a str,
    pub recipient_email: Option<&'a str>,
    pub recipient_phone: Option<&'a str>,
    pub message: &'a str,
}

/// Routes deliveries to the sender registered for each channel.
#[derive(Clone)]
pub struct Dispatcher {
    senders: HashMap<Channel, Arc<dyn ChannelSender>>,
    app_url: String,
}

impl Dispatcher {
    pub fn new(app_url: &str) -> Self {
        Self {
            senders: HashMap::new(),
            app_url: app_url.trim_end_matches('/').to_string(),
        }
    }

    #[must_use]
    pub fn with_sender(mut self, sender: Arc<dyn ChannelSender>) -> Self {
        self.senders.insert(sender.channel(), sender);
        self
    }

    pub fn is_available(&self, channel: Channel) -> bool {
        self.senders.contains_key(&channel)
    }

    /// Check that the delivery carries a well-formed address for `channel`.
    pub fn validate(channel: Channel, delivery: &Delivery<'_>) -> Result<String, MessagingError> {
        match channel {
            Channel::Email => {
                let email = delivery.recipient_email.map(str::trim).unwrap_or_default();
                if is_valid_email(email) {
                    Ok(email.to_string())
                } else {
                    Err(MessagingError::InvalidRecipient(
                        "a valid recipient email is required".into(),
                    ))
                }
            }
            Channel::Sms | Channel::Whatsapp => {
                let phone = delivery.recipient_phone.map(str::trim).unwrap_or_default();
                if is_valid_e164(phone) {
                    Ok(phone.to_string())
                } else {
                    Err(MessagingError::InvalidRecipient(
                        "recipient phone must be in E.164 format (e.g. +14155552671)".into(),
                    ))
                }
            }
        }
    }

    /// Render and send a proposal on `channel`.
    #[instrument(skip(self, delivery), fields(proposal_id = %delivery.proposal_id))]
    pub async fn dispatch(
        &self,
        channel: Channel,
        delivery: &Delivery<'_>,
    ) -> Result<DeliveryReceipt, MessagingError> {
        let to = Self::validate(channel, delivery)?;
        let sender = self
            .senders
            .get(&channel)
            .ok_or(MessagingError::ChannelUnavailable(channel))?;

        let link = proposal_link(&self.app_url, delivery.proposal_id);
        let outbound = match channel {
            Channel::Email => OutboundMessage {
                to,
                subject: Some(email_subject(delivery.sender_name, delivery.recipient_name)),
                html: Some(email_html(delivery.message, &link)),
                text: email_text(delivery.message, &link),
            },
            Channel::Sms | Channel::Whatsapp => OutboundMessage {
                to,
                subject: None,
                html: None,
                text: sms_body(delivery.message, &link),
            },
        };

        let result = sender.send(&outbound).await;
        #[cfg(feature = "metrics")]
        myproposal_core::metrics::record_delivery(channel.as_str(), result.is_ok());

        match result {
            Ok(reference) => {
                info!(%channel, %reference, "Proposal delivered");
                Ok(DeliveryReceipt { channel, reference })
            }
            Err(e) => {
                warn!(%channel, error = %e, "Proposal delivery failed");
                Err(e)
            }
        }
    }
}
