use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties, Consumer,
    message::Delivery,
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
        BasicRejectOptions, ConfirmSelectOptions, QueueDeclareOptions,
    },
    types::{AMQPValue, FieldTable},
};
use tracing::{debug, info};

use crate::{
    models::{
        message::{ATTEMPT_HEADER, DlqMessage},
        response::QueueStats,
    },
    utils::with_deadline,
};

pub struct RabbitMqClient {
    connection: Connection,
    channel: Channel,
    timeout: Duration,
}

impl RabbitMqClient {
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self, Error> {
        debug!("Connecting to RabbitMQ...");

        let connection = with_deadline(timeout, "RabbitMQ connect", async {
            Connection::connect(url, ConnectionProperties::default())
                .await
                .map_err(|e| anyhow!("Failed to connect to RabbitMQ: {}", e))
        })
        .await?;

        let channel = with_deadline(timeout, "RabbitMQ channel creation", async {
            connection
                .create_channel()
                .await
                .map_err(|e| anyhow!("RabbitMQ channel creation failed: {}", e))
        })
        .await?;

        // Publishes resolve only once the broker has taken responsibility.
        with_deadline(timeout, "Publisher confirms", async {
            channel
                .confirm_select(ConfirmSelectOptions::default())
                .await
                .map_err(|e| anyhow!("Failed to enable publisher confirms: {}", e))
        })
        .await?;

        debug!("RabbitMQ connection and channel established");

        Ok(Self {
            connection,
            channel,
            timeout,
        })
    }

    pub async fn declare_queue(&self, queue: &str) -> Result<QueueStats, Error> {
        let declared = with_deadline(self.timeout, "Queue declare", async {
            self.channel
                .queue_declare(
                    queue,
                    QueueDeclareOptions {
                        durable: true,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await
                .map_err(|e| anyhow!("Failed to declare queue '{}': {}", queue, e))
        })
        .await?;

        Ok(QueueStats {
            message_count: declared.message_count(),
            consumer_count: declared.consumer_count(),
        })
    }

    /// Declares `queue`, bounds unacknowledged deliveries to `prefetch_count`
    /// and starts a manual-ack consumer on it.
    pub async fn prepare_consumer(
        &self,
        queue: &str,
        prefetch_count: u16,
        consumer_tag: &str,
    ) -> Result<Consumer, Error> {
        self.declare_queue(queue).await?;

        with_deadline(self.timeout, "QoS setup", async {
            self.channel
                .basic_qos(prefetch_count, BasicQosOptions::default())
                .await
                .map_err(|e| anyhow!("Failed to set up QoS: {}", e))
        })
        .await?;

        let consumer = with_deadline(self.timeout, "Consumer creation", async {
            self.channel
                .basic_consume(
                    queue,
                    consumer_tag,
                    BasicConsumeOptions::default(),
                    FieldTable::default(),
                )
                .await
                .map_err(|e| anyhow!("Failed to create consumer: {}", e))
        })
        .await?;

        info!(queue, prefetch_count, consumer_tag, "Consumer created for queue");

        Ok(consumer)
    }

    pub async fn acknowledge(&self, delivery_tag: u64) -> Result<(), Error> {
        with_deadline(self.timeout, "Message ack", async {
            self.channel
                .basic_ack(delivery_tag, BasicAckOptions::default())
                .await
                .map_err(|e| anyhow!("Failed to acknowledge message: {}", e))
        })
        .await
    }

    pub async fn reject(&self, delivery_tag: u64, requeue: bool) -> Result<(), Error> {
        with_deadline(self.timeout, "Message reject", async {
            self.channel
                .basic_reject(delivery_tag, BasicRejectOptions { requeue })
                .await
                .map_err(|e| anyhow!("Failed to reject message: {}", e))
        })
        .await
    }

    /// Publishes a persistent message tagged with its delivery attempt.
    pub async fn publish(&self, queue: &str, payload: &[u8], attempt: u32) -> Result<(), Error> {
        let mut headers = FieldTable::default();
        headers.insert(ATTEMPT_HEADER.into(), AMQPValue::LongUInt(attempt));

        let properties = BasicProperties::default()
            .with_delivery_mode(2)
            .with_content_type("application/json".into())
            .with_headers(headers);

        self.publish_with(queue, payload, properties).await
    }

    pub async fn publish_to_dlq(&self, queue: &str, message: &DlqMessage) -> Result<(), Error> {
        let payload = serde_json::to_vec(message)?;

        self.declare_queue(queue).await?;

        let properties = BasicProperties::default()
            .with_delivery_mode(2)
            .with_content_type("application/json".into());

        self.publish_with(queue, &payload, properties)
            .await
            .map_err(|e| anyhow!("Failed to publish message to dlq: {}", e))
    }

    async fn publish_with(
        &self,
        queue: &str,
        payload: &[u8],
        properties: BasicProperties,
    ) -> Result<(), Error> {
        let confirmation = with_deadline(self.timeout, "Message publish", async {
            self.channel
                .basic_publish(
                    "",
                    queue,
                    BasicPublishOptions::default(),
                    payload,
                    properties,
                )
                .await
                .map_err(|e| anyhow!("Failed to publish message: {}", e))?
                .await
                .map_err(|e| anyhow!("Broker did not confirm publish: {}", e))
        })
        .await?;

        if confirmation.is_nack() {
            return Err(anyhow!("Broker rejected publish to '{}'", queue));
        }

        Ok(())
    }

    pub async fn queue_stats(&self, queue: &str) -> Result<QueueStats, Error> {
        self.declare_queue(queue).await
    }

    pub async fn close(&self) -> Result<(), Error> {
        with_deadline(self.timeout, "RabbitMQ close", async {
            self.connection
                .close(200, "closing".into())
                .await
                .map_err(|e| anyhow!("Failed to close RabbitMQ connection: {}", e))
        })
        .await
    }
}

/// Reads the delivery attempt a message was published with; producers that
/// know nothing of the header start at 1.
pub fn delivery_attempt(delivery: &Delivery) -> u32 {
    delivery
        .properties
        .headers()
        .as_ref()
        .and_then(|headers| {
            headers
                .inner()
                .iter()
                .find(|(key, _)| key.as_str() == ATTEMPT_HEADER)
                .and_then(|(_, value)| attempt_from_value(value))
        })
        .unwrap_or(1)
        .max(1)
}

fn attempt_from_value(value: &AMQPValue) -> Option<u32> {
    match value {
        AMQPValue::ShortShortUInt(v) => Some(u32::from(*v)),
        AMQPValue::ShortUInt(v) => Some(u32::from(*v)),
        AMQPValue::LongUInt(v) => Some(*v),
        AMQPValue::ShortShortInt(v) => u32::try_from(*v).ok(),
        AMQPValue::ShortInt(v) => u32::try_from(*v).ok(),
        AMQPValue::LongInt(v) => u32::try_from(*v).ok(),
        AMQPValue::LongLongInt(v) => u32::try_from(*v).ok(),
        _ => None,
    }
}
