use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::{Customer, Order, Product};

// ============================================================================
// Wire Envelopes
// ============================================================================
//
// Every event on the `events` exchange is a JSON object:
//
//   { "type": "customer.created", "<domain>": { ... }, "timestamp": "<RFC 3339>" }
//
// where `<domain>` is `customer`, `order` or `product`. The event type
// doubles as the routing key.
//
// ============================================================================

/// Event types this service produces or consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "customer.created")]
    CustomerCreated,
    #[serde(rename = "customer.updated")]
    CustomerUpdated,
    #[serde(rename = "customer.deleted")]
    CustomerDeleted,
    #[serde(rename = "order.created")]
    OrderCreated,
    #[serde(rename = "order.updated")]
    OrderUpdated,
    #[serde(rename = "order.deleted")]
    OrderDeleted,
    #[serde(rename = "product.created")]
    ProductCreated,
    #[serde(rename = "product.updated")]
    ProductUpdated,
    #[serde(rename = "product.deleted")]
    ProductDeleted,
}

impl EventType {
    pub const ALL: [EventType; 9] = [
        EventType::CustomerCreated,
        EventType::CustomerUpdated,
        EventType::CustomerDeleted,
        EventType::OrderCreated,
        EventType::OrderUpdated,
        EventType::OrderDeleted,
        EventType::ProductCreated,
        EventType::ProductUpdated,
        EventType::ProductDeleted,
    ];

    /// Canonical dot-separated form, also used as the routing key
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::CustomerCreated => "customer.created",
            EventType::CustomerUpdated => "customer.updated",
            EventType::CustomerDeleted => "customer.deleted",
            EventType::OrderCreated => "order.created",
            EventType::OrderUpdated => "order.updated",
            EventType::OrderDeleted => "order.deleted",
            EventType::ProductCreated => "product.created",
            EventType::ProductUpdated => "product.updated",
            EventType::ProductDeleted => "product.deleted",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown event type: {0}")]
pub struct UnknownEventType(pub String);

impl FromStr for EventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .into_iter()
            .find(|event_type| event_type.as_str() == s)
            .ok_or_else(|| UnknownEventType(s.to_string()))
    }
}

/// An envelope that can be published: it knows its own event type
pub trait OutboundEvent: Serialize + Send + Sync {
    fn event_type(&self) -> EventType;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub customer: Customer,
    pub timestamp: DateTime<Utc>,
}

impl CustomerEvent {
    pub fn new(event_type: EventType, customer: Customer) -> Self {
        Self {
            event_type,
            customer,
            timestamp: Utc::now(),
        }
    }
}

impl OutboundEvent for CustomerEvent {
    fn event_type(&self) -> EventType {
        self.event_type
    }
}

// Inbound envelopes are owned by peer services: the routing key already
// selected the handler, so `type` is kept verbatim and `timestamp` may be
// missing or null.

/// Event published by the orders service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub order: Order,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Event published by the products service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub product: Product,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Loose view of any envelope: only the type is required, so events from
/// services this crate does not know about still parse
#[derive(Debug, Clone, Deserialize)]
pub struct GenericEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}
