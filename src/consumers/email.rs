use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::{
    consumers::DeliveryHandler,
    dispatcher::EmailDispatcher,
    models::{
        email::{DeliveryResult, EmailNotification},
        message::{Acknowledgement, DlqMessage, InboundMessage},
    },
};

pub struct EmailConsumer {
    queue: String,
    dispatcher: Arc<EmailDispatcher>,
    max_attempts: u32,
}

impl EmailConsumer {
    pub fn new(queue: impl Into<String>, dispatcher: Arc<EmailDispatcher>, max_attempts: u32) -> Self {
        Self {
            queue: queue.into(),
            dispatcher,
            max_attempts: max_attempts.max(1),
        }
    }
}

#[async_trait]
impl DeliveryHandler for EmailConsumer {
    fn queue(&self) -> &str {
        &self.queue
    }

    async fn handle(&self, message: &InboundMessage) -> Acknowledgement {
        let notification = match serde_json::from_slice::<EmailNotification>(&message.payload) {
            Ok(notification) => notification,
            Err(e) => {
                warn!(
                    queue = %self.queue,
                    error = %e,
                    payload = %String::from_utf8_lossy(&message.payload),
                    "Dropping malformed email message"
                );
                return Acknowledgement::Reject { requeue: false };
            }
        };

        info!(
            recipient = %notification.recipient,
            kind = ?notification.kind,
            attempt = message.attempt,
            "Email message received"
        );

        match self.dispatcher.dispatch(&notification).await {
            DeliveryResult::Delivered { message_id } => {
                info!(
                    recipient = %notification.recipient,
                    message_id = %message_id,
                    "Email processed"
                );
                Acknowledgement::Ack
            }
            DeliveryResult::Failed { error } if message.attempt < self.max_attempts => {
                warn!(
                    recipient = %notification.recipient,
                    attempt = message.attempt,
                    max_attempts = self.max_attempts,
                    error = %error,
                    "Email send failed, scheduling retry"
                );
                Acknowledgement::Retry {
                    attempt: message.attempt + 1,
                }
            }
            DeliveryResult::Failed { error } => {
                error!(
                    recipient = %notification.recipient,
                    attempts = message.attempt,
                    error = %error,
                    "Email send failed on final attempt, dead-lettering"
                );
                Acknowledgement::DeadLetter(Box::new(DlqMessage::new(
                    self.queue.clone(),
                    notification,
                    error,
                    message.attempt,
                )))
            }
        }
    }
}
