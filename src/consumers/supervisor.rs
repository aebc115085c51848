use std::{panic::AssertUnwindSafe, sync::Arc, time::Duration};

use anyhow::{Error, Result, anyhow};
use futures_util::{FutureExt, StreamExt};
use lapin::message::Delivery;
use tokio::{sync::watch, time::sleep};
use tracing::{debug, error, info, warn};

use crate::{
    clients::rbmq::{RabbitMqClient, delivery_attempt},
    config::Config,
    consumers::DeliveryHandler,
    models::{
        health::BrokerHealth,
        message::{Acknowledgement, InboundMessage},
        retry::RetryConfig,
    },
    utils::Backoff,
};

/// Keeps one consumer attached to its queue: connects, consumes until the
/// connection breaks, backs off, and starts over. Never returns.
pub struct ConsumerSupervisor {
    rabbitmq_url: String,
    prefetch_count: u16,
    broker_timeout: Duration,
    dead_letter_queue: String,
    reconnect: RetryConfig,
    handler: Arc<dyn DeliveryHandler>,
    health: watch::Sender<BrokerHealth>,
}

impl ConsumerSupervisor {
    pub fn new(config: &Config, handler: Arc<dyn DeliveryHandler>) -> Self {
        let (health, _) = watch::channel(BrokerHealth::connecting());

        Self {
            rabbitmq_url: config.rabbitmq_url.clone(),
            prefetch_count: config.prefetch_count,
            broker_timeout: config.broker_timeout(),
            dead_letter_queue: config.failed_queue.clone(),
            reconnect: config.reconnect_config(),
            handler,
            health,
        }
    }

    pub fn queue(&self) -> &str {
        self.handler.queue()
    }

    pub fn health(&self) -> watch::Receiver<BrokerHealth> {
        self.health.subscribe()
    }

    pub async fn run(self) {
        let mut backoff = Backoff::new(&self.reconnect);

        loop {
            let error = match self.consume(&mut backoff).await {
                Ok(()) => anyhow!("Delivery stream ended"),
                Err(e) => e,
            };

            let delay = backoff.next_delay();

            self.health
                .send_modify(|health| *health = health.reconnecting(error.to_string()));

            warn!(
                queue = %self.queue(),
                error = %error,
                retry_in_ms = delay.as_millis() as u64,
                failures = self.health.borrow().consecutive_failures,
                "Consumer disconnected from RabbitMQ, reconnecting"
            );

            sleep(delay).await;
        }
    }

    async fn consume(&self, backoff: &mut Backoff) -> Result<(), Error> {
        let queue = self.queue().to_string();
        let client = RabbitMqClient::connect(&self.rabbitmq_url, self.broker_timeout).await?;

        let consumer_tag = format!("notification_relay.{}", queue);
        let mut consumer = client
            .prepare_consumer(&queue, self.prefetch_count, &consumer_tag)
            .await?;

        backoff.reset();
        self.health.send_replace(BrokerHealth::connected());

        info!(queue = %queue, "Waiting for messages");

        while let Some(delivery) = consumer.next().await {
            let delivery = delivery.map_err(|e| anyhow!("Consumer stream failed: {}", e))?;
            self.process(&client, delivery).await?;
        }

        Ok(())
    }

    async fn process(&self, client: &RabbitMqClient, delivery: Delivery) -> Result<(), Error> {
        let message = InboundMessage::new(delivery.data.clone(), delivery_attempt(&delivery));

        debug!(
            queue = %self.queue(),
            delivery_tag = delivery.delivery_tag,
            attempt = message.attempt,
            redelivered = delivery.redelivered,
            "Delivery received"
        );

        let decision = handle_guarded(self.handler.as_ref(), &message).await;

        settle(
            client,
            self.queue(),
            &self.dead_letter_queue,
            delivery.delivery_tag,
            &message.payload,
            decision,
        )
        .await
    }
}

/// Runs a handler, turning a panic into a reject without requeue.
pub async fn handle_guarded(handler: &dyn DeliveryHandler, message: &InboundMessage) -> Acknowledgement {
    match AssertUnwindSafe(handler.handle(message)).catch_unwind().await {
        Ok(decision) => decision,
        Err(_) => {
            error!(
                queue = %handler.queue(),
                "Handler panicked while processing a delivery, discarding it"
            );
            Acknowledgement::Reject { requeue: false }
        }
    }
}

/// Applies a handler decision to the broker. When a retry or dead-letter
/// publish fails the delivery is handed back to the broker instead of lost.
pub async fn settle(
    client: &RabbitMqClient,
    queue: &str,
    dead_letter_queue: &str,
    delivery_tag: u64,
    payload: &[u8],
    decision: Acknowledgement,
) -> Result<(), Error> {
    match decision {
        Acknowledgement::Ack => client.acknowledge(delivery_tag).await,
        Acknowledgement::Reject { requeue } => client.reject(delivery_tag, requeue).await,
        Acknowledgement::Retry { attempt } => match client.publish(queue, payload, attempt).await {
            Ok(()) => client.acknowledge(delivery_tag).await,
            Err(e) => {
                warn!(queue, attempt, error = %e, "Retry publish failed, requeueing delivery");
                client.reject(delivery_tag, true).await
            }
        },
        Acknowledgement::DeadLetter(message) => {
            match client.publish_to_dlq(dead_letter_queue, &message).await {
                Ok(()) => {
                    info!(
                        queue,
                        dead_letter_queue,
                        recipient = %message.original_message.recipient,
                        "Message moved to dead-letter queue"
                    );
                    client.acknowledge(delivery_tag).await
                }
                Err(e) => {
                    warn!(queue, error = %e, "Dead-letter publish failed, requeueing delivery");
                    client.reject(delivery_tag, true).await
                }
            }
        }
    }
}
