// ============================================================================
// Messaging Module - broker transport, envelopes, publisher and consumer
// ============================================================================

pub mod amqp;
mod consumer;
mod envelope;
pub mod memory;
mod publisher;
mod transport;

pub use amqp::{AmqpBroker, AmqpPublisherChannel, AmqpSubscription};
pub use consumer::{ConsumerLoop, ConsumerState, ConsumerStats};
pub use envelope::{
    CustomerEvent, EventType, GenericEvent, OrderEvent, OutboundEvent, ProductEvent, UnknownEventType,
};
pub use memory::{InMemoryBroker, InMemorySubscription, Settlement};
pub use publisher::{PublishError, Publisher, DEFAULT_EXCHANGE, DEFAULT_PUBLISH_TIMEOUT};
pub use transport::{
    BrokerChannel, Delivery, DeliveryAcker, OutboundMessage, Subscription, TransportError,
};
