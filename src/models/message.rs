use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::models::email::EmailNotification;

/// Header carrying how many times a message has been handed to a consumer.
pub const ATTEMPT_HEADER: &str = "x-delivery-attempt";

/// A delivery pulled off a queue, reduced to what handlers need.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub payload: Vec<u8>,
    pub attempt: u32,
}

impl InboundMessage {
    pub fn new(payload: impl Into<Vec<u8>>, attempt: u32) -> Self {
        Self {
            payload: payload.into(),
            attempt: attempt.max(1),
        }
    }

    pub fn first_attempt(payload: impl Into<Vec<u8>>) -> Self {
        Self::new(payload, 1)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DlqMessage {
    pub queue: String,
    pub original_message: EmailNotification,
    pub failure_reason: String,
    pub attempts: u32,
    pub failed_at: String,
}

impl DlqMessage {
    pub fn new(
        queue: impl Into<String>,
        original_message: EmailNotification,
        failure_reason: impl Into<String>,
        attempts: u32,
    ) -> Self {
        Self {
            queue: queue.into(),
            original_message,
            failure_reason: failure_reason.into(),
            attempts,
            failed_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

/// How a handled delivery is settled with the broker.
#[derive(Debug, Clone, PartialEq)]
pub enum Acknowledgement {
    Ack,
    Reject { requeue: bool },
    /// Republish the payload with the given attempt number, then ack the original.
    Retry { attempt: u32 },
    /// Publish to the dead-letter queue, then ack the original.
    DeadLetter(Box<DlqMessage>),
}
