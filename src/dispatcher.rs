use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    clients::mailer::MailSender,
    models::email::{DeliveryResult, EmailNotification, EmailType, OutboundEmail},
    templates,
    utils::strip_html,
};

/// The ways a notification can be turned into an email.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositionPath {
    OrderConfirmation,
    Welcome,
    PaymentConfirmation,
}

impl CompositionPath {
    /// Anything without a dedicated path is sent as an order confirmation.
    pub fn route(kind: Option<EmailType>) -> Self {
        match kind {
            Some(EmailType::Welcome) => CompositionPath::Welcome,
            Some(EmailType::PaymentConfirmation) => CompositionPath::PaymentConfirmation,
            Some(EmailType::OrderConfirmation)
            | Some(EmailType::Test)
            | Some(EmailType::Unrecognized)
            | None => CompositionPath::OrderConfirmation,
        }
    }

    fn default_sender_name(&self) -> &'static str {
        match self {
            CompositionPath::OrderConfirmation => "Notifications",
            CompositionPath::Welcome => "Welcome",
            CompositionPath::PaymentConfirmation => "Payments",
        }
    }
}

pub struct EmailDispatcher {
    sender: Arc<dyn MailSender>,
    from_name: Option<String>,
}

impl EmailDispatcher {
    pub fn new(sender: Arc<dyn MailSender>, from_name: Option<String>) -> Self {
        Self { sender, from_name }
    }

    pub fn compose(&self, notification: &EmailNotification) -> (CompositionPath, OutboundEmail) {
        let path = CompositionPath::route(notification.kind);

        let (html_body, text_body) = match path {
            CompositionPath::Welcome => (
                templates::welcome(&notification.body),
                templates::welcome_text(&notification.body),
            ),
            CompositionPath::OrderConfirmation | CompositionPath::PaymentConfirmation => {
                (notification.body.clone(), strip_html(&notification.body))
            }
        };

        let from_name = self
            .from_name
            .clone()
            .unwrap_or_else(|| path.default_sender_name().to_string());

        let email = OutboundEmail {
            to: notification.recipient.clone(),
            from_name,
            subject: notification.subject.clone(),
            html_body,
            text_body,
            attachments: notification.attachments.clone(),
        };

        (path, email)
    }

    /// Composes and sends; the sender's result is returned as-is.
    pub async fn dispatch(&self, notification: &EmailNotification) -> DeliveryResult {
        let (path, email) = self.compose(notification);

        debug!(
            recipient = %notification.recipient,
            kind = ?notification.kind,
            path = ?path,
            sender = self.sender.name(),
            "Dispatching email"
        );

        let result = self.sender.send(&email).await;

        match &result {
            DeliveryResult::Delivered { message_id } => info!(
                recipient = %notification.recipient,
                path = ?path,
                message_id = %message_id,
                "Email delivered"
            ),
            DeliveryResult::Failed { error } => warn!(
                recipient = %notification.recipient,
                path = ?path,
                error = %error,
                "Email delivery failed"
            ),
        }

        result
    }
}
