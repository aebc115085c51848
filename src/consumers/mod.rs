use async_trait::async_trait;

use crate::models::message::{Acknowledgement, InboundMessage};

pub mod email;
pub mod payment;
pub mod supervisor;

/// Decides how a single delivery from one queue is settled. Handlers never
/// touch the broker themselves; the supervisor applies the returned decision.
#[async_trait]
pub trait DeliveryHandler: Send + Sync {
    fn queue(&self) -> &str;

    async fn handle(&self, message: &InboundMessage) -> Acknowledgement;
}
