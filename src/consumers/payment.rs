use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::{
    clients::orders::OrderStatusClient,
    consumers::DeliveryHandler,
    dispatcher::EmailDispatcher,
    models::{
        credential::{BearerCredential, RecipientError},
        email::{DeliveryResult, EmailNotification, EmailType},
        message::{Acknowledgement, InboundMessage},
        payment::PaymentEvent,
    },
    templates,
};

/// Where the notification recipient came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipientSource {
    Event,
    Order,
    Credential,
}

/// What happened to a payment event. Every variant is acknowledged.
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentOutcome {
    Notified {
        recipient: String,
        source: RecipientSource,
        message_id: String,
    },
    NotificationFailed {
        recipient: String,
        error: String,
    },
    StatusUpdateFailed {
        error: String,
    },
    RecipientUnresolved,
}

pub struct PaymentOrchestrator {
    queue: String,
    dispatcher: Arc<EmailDispatcher>,
    orders: Arc<dyn OrderStatusClient>,
    credential: Option<BearerCredential>,
    paid_status: String,
}

impl PaymentOrchestrator {
    pub fn new(
        queue: impl Into<String>,
        dispatcher: Arc<EmailDispatcher>,
        orders: Arc<dyn OrderStatusClient>,
        credential: Option<BearerCredential>,
        paid_status: impl Into<String>,
    ) -> Self {
        Self {
            queue: queue.into(),
            dispatcher,
            orders,
            credential,
            paid_status: paid_status.into(),
        }
    }

    /// Update order state, then resolve a recipient, then notify. Each step
    /// runs only if the previous one succeeded, and nothing is retried.
    pub async fn process(&self, event: &PaymentEvent) -> PaymentOutcome {
        let update = self
            .orders
            .update_status(&event.order_id, &self.paid_status)
            .await;

        if let Some(detail) = update.error_detail() {
            if update.is_unauthorized() {
                warn!(
                    order_id = %event.order_id,
                    "Order service returned 401; the JWT_TOKEN credential is invalid or expired"
                );
            }

            error!(
                order_id = %event.order_id,
                error = %detail,
                "Order status update failed, no email will be sent"
            );

            return PaymentOutcome::StatusUpdateFailed {
                error: detail.to_string(),
            };
        }

        let Some((recipient, source)) = self.resolve_recipient(event).await else {
            error!(
                order_id = %event.order_id,
                "No recipient could be resolved, no email will be sent"
            );
            return PaymentOutcome::RecipientUnresolved;
        };

        let notification = EmailNotification::new(
            recipient.clone(),
            templates::payment_confirmation_subject(&event.order_id),
            templates::payment_confirmation(event),
            Some(EmailType::PaymentConfirmation),
        );

        match self.dispatcher.dispatch(&notification).await {
            DeliveryResult::Delivered { message_id } => {
                info!(
                    order_id = %event.order_id,
                    recipient = %recipient,
                    source = ?source,
                    "Payment confirmation sent"
                );
                PaymentOutcome::Notified {
                    recipient,
                    source,
                    message_id,
                }
            }
            DeliveryResult::Failed { error } => {
                error!(
                    order_id = %event.order_id,
                    recipient = %recipient,
                    error = %error,
                    "Payment confirmation could not be sent"
                );
                PaymentOutcome::NotificationFailed { recipient, error }
            }
        }
    }

    /// Event payload first, then the order record, then the identity claim of
    /// the shared credential.
    pub async fn resolve_recipient(&self, event: &PaymentEvent) -> Option<(String, RecipientSource)> {
        let credential_claim = self.credential_claim();

        if let Some(email) = event.recipient_hint() {
            if let Ok(claim) = &credential_claim {
                if !claim.eq_ignore_ascii_case(email) {
                    warn!(
                        order_id = %event.order_id,
                        event_recipient = %email,
                        credential_recipient = %claim,
                        "Event userEmail differs from the credential identity, using the event"
                    );
                }
            }
            return Some((email.to_string(), RecipientSource::Event));
        }

        match self.orders.fetch_order(&event.order_id).await {
            Ok(Some(order)) => {
                if let Some(email) = order.recipient() {
                    return Some((email.to_string(), RecipientSource::Order));
                }
            }
            Ok(None) => {
                warn!(order_id = %event.order_id, "Order not found while resolving recipient");
            }
            Err(e) => {
                warn!(
                    order_id = %event.order_id,
                    error = %e,
                    "Order lookup failed while resolving recipient"
                );
            }
        }

        match credential_claim {
            Ok(claim) => Some((claim, RecipientSource::Credential)),
            Err(e) => {
                warn!(order_id = %event.order_id, error = %e, "Credential has no usable identity");
                None
            }
        }
    }

    fn credential_claim(&self) -> Result<String, RecipientError> {
        self.credential
            .as_ref()
            .ok_or(RecipientError::MissingCredential)?
            .identity_claim()
    }
}

#[async_trait]
impl DeliveryHandler for PaymentOrchestrator {
    fn queue(&self) -> &str {
        &self.queue
    }

    async fn handle(&self, message: &InboundMessage) -> Acknowledgement {
        let event = match PaymentEvent::parse(&message.payload) {
            Ok(event) => event,
            Err(e) => {
                warn!(
                    queue = %self.queue,
                    error = %e,
                    payload = %String::from_utf8_lossy(&message.payload),
                    "Dropping malformed payment event"
                );
                return Acknowledgement::Reject { requeue: false };
            }
        };

        info!(
            order_id = %event.order_id,
            amount = ?event.amount,
            status = ?event.status,
            "Payment event received"
        );

        let outcome = self.process(&event).await;

        info!(order_id = %event.order_id, outcome = ?outcome, "Payment event settled");

        Acknowledgement::Ack
    }
}
