use async_trait::async_trait;
use std::fmt;

// ============================================================================
// Broker Transport Seam
// ============================================================================
//
// The publisher and the consumer loop depend on these traits only, so the
// AMQP adapter can be swapped for the in-memory broker in tests.
//
// A channel is owned by one actor: the publisher gets its own channel and
// each consumer loop owns its own subscription.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Broker connection error: {0}")]
    Connection(String),

    #[error("Broker channel error: {0}")]
    Channel(String),

    #[error("Failed to publish message: {0}")]
    Publish(String),

    #[error("Publish timed out after {0} ms")]
    Timeout(u64),

    #[error("Failed to acknowledge delivery {delivery_tag}: {reason}")]
    Ack { delivery_tag: u64, reason: String },

    #[error("Circuit breaker open for broker publishing")]
    CircuitOpen,
}

impl TransportError {
    /// Short label used as a metrics dimension
    pub fn reason(&self) -> &'static str {
        match self {
            TransportError::Connection(_) => "connection",
            TransportError::Channel(_) => "channel",
            TransportError::Publish(_) => "publish",
            TransportError::Timeout(_) => "timeout",
            TransportError::Ack { .. } => "ack",
            TransportError::CircuitOpen => "circuit_open",
        }
    }
}

/// An outbound message as handed to the broker
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub exchange: String,
    pub routing_key: String,
    pub content_type: String,
    pub body: Vec<u8>,
}

/// Publishing side of a broker channel
#[async_trait]
pub trait BrokerChannel: Send + Sync {
    /// Send a message, non-mandatory and non-immediate. Success means the
    /// broker accepted it, not that any queue received it.
    async fn publish(&self, message: OutboundMessage) -> Result<(), TransportError>;
}

/// Settles a single delivery with the broker
#[async_trait]
pub trait DeliveryAcker: Send + Sync {
    async fn ack(&self, delivery_tag: u64) -> Result<(), TransportError>;
    async fn reject(&self, delivery_tag: u64, requeue: bool) -> Result<(), TransportError>;
}

/// One inbound message. Settling consumes the delivery, so it can be acked
/// or rejected at most once.
pub struct Delivery {
    pub delivery_tag: u64,
    pub routing_key: String,
    pub body: Vec<u8>,
    pub redelivered: bool,
    acker: Box<dyn DeliveryAcker>,
}

impl Delivery {
    pub fn new(
        delivery_tag: u64,
        routing_key: impl Into<String>,
        body: Vec<u8>,
        redelivered: bool,
        acker: Box<dyn DeliveryAcker>,
    ) -> Self {
        Self {
            delivery_tag,
            routing_key: routing_key.into(),
            body,
            redelivered,
            acker,
        }
    }

    pub async fn ack(self) -> Result<(), TransportError> {
        self.acker.ack(self.delivery_tag).await
    }

    pub async fn reject(self, requeue: bool) -> Result<(), TransportError> {
        self.acker.reject(self.delivery_tag, requeue).await
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("delivery_tag", &self.delivery_tag)
            .field("routing_key", &self.routing_key)
            .field("body_len", &self.body.len())
            .field("redelivered", &self.redelivered)
            .finish()
    }
}

/// Consuming side: a durable subscription to a queue
#[async_trait]
pub trait Subscription: Send {
    /// Wait for the next delivery. `None` means the broker closed the
    /// subscription; `Some(Err(_))` means the connection failed.
    async fn next_delivery(&mut self) -> Option<Result<Delivery, TransportError>>;

    /// Cancel the subscription and close its channel
    async fn close(&mut self) -> Result<(), TransportError>;
}
