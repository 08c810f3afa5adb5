use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::acker::Acker;
use lapin::options::{
    BasicAckOptions, BasicCancelOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
    BasicQosOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, Consumer, ExchangeKind};
use uuid::Uuid;

use crate::utils::{retry_with_backoff, RetryConfig};

use super::transport::{
    BrokerChannel, Delivery, DeliveryAcker, OutboundMessage, Subscription, TransportError,
};

// ============================================================================
// RabbitMQ Adapter (lapin)
// ============================================================================
//
// Topology:
// - one durable topic exchange (default `events`)
// - one durable queue per service, bound once per registered pattern
//
// Every actor gets its own channel: the publisher opens one, and every
// subscription opens another. Channels are never shared between tasks.
//
// ============================================================================

const REPLY_SUCCESS: u16 = 200;

pub struct AmqpBroker {
    connection: Connection,
    exchange: String,
}

impl AmqpBroker {
    /// Connect (retrying while the broker boots) and declare the exchange
    pub async fn connect(url: &str, exchange: &str) -> Result<Self, TransportError> {
        let connection = retry_with_backoff(RetryConfig::aggressive(), "amqp_connect", |attempt| {
            tracing::debug!(attempt = attempt, "Connecting to RabbitMQ");
            Connection::connect(url, ConnectionProperties::default())
        })
        .await
        .map_err(|e| TransportError::Connection(e.to_string()))?;

        let broker = Self {
            connection,
            exchange: exchange.to_string(),
        };

        let channel = broker.open_channel().await?;
        channel
            .exchange_declare(
                exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| TransportError::Channel(format!("exchange declare failed: {}", e)))?;
        if let Err(e) = channel.close(REPLY_SUCCESS, "topology declared").await {
            tracing::warn!(exchange = %exchange, error = %e, "Failed to close topology channel");
        }

        tracing::info!(exchange = %exchange, "🐇 Connected to RabbitMQ");
        Ok(broker)
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    async fn open_channel(&self) -> Result<Channel, TransportError> {
        self.connection
            .create_channel()
            .await
            .map_err(|e| TransportError::Channel(e.to_string()))
    }

    /// A dedicated channel for the publisher
    pub async fn publisher_channel(&self) -> Result<AmqpPublisherChannel, TransportError> {
        Ok(AmqpPublisherChannel {
            channel: self.open_channel().await?,
        })
    }

    /// Declare `queue`, bind it with every binding key and start consuming
    /// on a fresh channel
    pub async fn subscribe(
        &self,
        queue: &str,
        binding_keys: &[String],
        prefetch: u16,
    ) -> Result<AmqpSubscription, TransportError> {
        let channel = self.open_channel().await?;
        let channel_err = |e: lapin::Error| TransportError::Channel(e.to_string());

        channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(channel_err)?;

        for key in binding_keys {
            channel
                .queue_bind(queue, &self.exchange, key, QueueBindOptions::default(), FieldTable::default())
                .await
                .map_err(channel_err)?;
            tracing::debug!(queue = %queue, binding_key = %key, "Bound queue");
        }

        channel
            .basic_qos(prefetch, BasicQosOptions::default())
            .await
            .map_err(channel_err)?;

        let consumer_tag = format!("customer-events-{}", Uuid::new_v4());
        let consumer = channel
            .basic_consume(queue, &consumer_tag, BasicConsumeOptions::default(), FieldTable::default())
            .await
            .map_err(channel_err)?;

        tracing::info!(
            queue = %queue,
            consumer_tag = %consumer_tag,
            bindings = binding_keys.len(),
            prefetch = prefetch,
            "Subscribed to queue"
        );

        Ok(AmqpSubscription {
            channel,
            consumer,
            consumer_tag,
        })
    }

    pub async fn close(&self) -> Result<(), TransportError> {
        self.connection
            .close(REPLY_SUCCESS, "shutdown")
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))
    }
}

pub struct AmqpPublisherChannel {
    channel: Channel,
}

#[async_trait]
impl BrokerChannel for AmqpPublisherChannel {
    async fn publish(&self, message: OutboundMessage) -> Result<(), TransportError> {
        let properties = BasicProperties::default().with_content_type(message.content_type.into());

        self.channel
            .basic_publish(
                &message.exchange,
                &message.routing_key,
                BasicPublishOptions {
                    mandatory: false,
                    immediate: false,
                },
                &message.body,
                properties,
            )
            .await
            .map_err(|e| TransportError::Publish(e.to_string()))?
            .await
            .map_err(|e| TransportError::Publish(e.to_string()))?;

        Ok(())
    }
}

struct AmqpAcker {
    acker: Acker,
}

#[async_trait]
impl DeliveryAcker for AmqpAcker {
    async fn ack(&self, delivery_tag: u64) -> Result<(), TransportError> {
        self.acker
            .ack(BasicAckOptions::default())
            .await
            .map_err(|e| TransportError::Ack {
                delivery_tag,
                reason: e.to_string(),
            })
    }

    async fn reject(&self, delivery_tag: u64, requeue: bool) -> Result<(), TransportError> {
        self.acker
            .nack(BasicNackOptions {
                multiple: false,
                requeue,
            })
            .await
            .map_err(|e| TransportError::Ack {
                delivery_tag,
                reason: e.to_string(),
            })
    }
}

pub struct AmqpSubscription {
    channel: Channel,
    consumer: Consumer,
    consumer_tag: String,
}

#[async_trait]
impl Subscription for AmqpSubscription {
    async fn next_delivery(&mut self) -> Option<Result<Delivery, TransportError>> {
        let next = self.consumer.next().await?;

        Some(
            next.map(|delivery| {
                Delivery::new(
                    delivery.delivery_tag,
                    delivery.routing_key.as_str(),
                    delivery.data,
                    delivery.redelivered,
                    Box::new(AmqpAcker { acker: delivery.acker }),
                )
            })
            .map_err(|e| TransportError::Connection(e.to_string())),
        )
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.channel
            .basic_cancel(&self.consumer_tag, BasicCancelOptions::default())
            .await
            .map_err(|e| TransportError::Channel(e.to_string()))?;
        self.channel
            .close(REPLY_SUCCESS, "consumer stopped")
            .await
            .map_err(|e| TransportError::Channel(e.to_string()))?;

        tracing::info!(consumer_tag = %self.consumer_tag, "Subscription closed");
        Ok(())
    }
}
