use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use crate::routing::{RoutingKey, TopicPattern};

use super::transport::{
    BrokerChannel, Delivery, DeliveryAcker, OutboundMessage, Subscription, TransportError,
};

// ============================================================================
// In-Memory Broker
// ============================================================================
//
// A single topic exchange kept in process. Published messages are recorded
// and routed to every subscription with a matching binding key. Ack/reject
// decisions are recorded instead of being acted upon: a rejected message is
// never redelivered here.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Acked(u64),
    Rejected { delivery_tag: u64, requeue: bool },
}

struct Binding {
    patterns: Vec<TopicPattern>,
    sender: mpsc::UnboundedSender<Delivery>,
}

#[derive(Default)]
struct BrokerState {
    published: Mutex<Vec<OutboundMessage>>,
    settlements: Mutex<Vec<Settlement>>,
    bindings: Mutex<Vec<Binding>>,
    fail_publishes: AtomicBool,
    next_delivery_tag: AtomicU64,
}

#[derive(Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<BrokerState>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent publish fail with a transport error
    pub fn fail_publishes(&self, fail: bool) {
        self.state.fail_publishes.store(fail, Ordering::SeqCst);
    }

    /// Messages accepted through `BrokerChannel::publish`, in order
    pub fn published(&self) -> Vec<OutboundMessage> {
        lock(&self.state.published).clone()
    }

    pub fn settlements(&self) -> Vec<Settlement> {
        lock(&self.state.settlements).clone()
    }

    /// Open a subscription receiving every message whose routing key matches
    /// one of `binding_keys`
    pub fn subscribe(&self, binding_keys: &[String]) -> Result<InMemorySubscription, TransportError> {
        let patterns = binding_keys
            .iter()
            .map(|key| TopicPattern::parse(key))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| TransportError::Channel(e.to_string()))?;

        let (sender, receiver) = mpsc::unbounded_channel();
        lock(&self.state.bindings).push(Binding { patterns, sender });

        Ok(InMemorySubscription {
            receiver,
            closed: false,
        })
    }

    /// Route a message as if a peer service had published it.
    /// Returns the number of subscriptions it reached.
    pub fn deliver(&self, routing_key: &str, body: impl Into<Vec<u8>>) -> usize {
        let body = body.into();
        let key = RoutingKey::from(routing_key);
        let mut bindings = lock(&self.state.bindings);
        bindings.retain(|binding| !binding.sender.is_closed());

        let mut reached = 0;
        for binding in bindings.iter() {
            if !binding.patterns.iter().any(|pattern| pattern.matches(&key)) {
                continue;
            }
            let tag = self.state.next_delivery_tag.fetch_add(1, Ordering::SeqCst) + 1;
            let delivery = Delivery::new(
                tag,
                routing_key,
                body.clone(),
                false,
                Box::new(RecordingAcker { state: self.state.clone() }),
            );
            if binding.sender.send(delivery).is_ok() {
                reached += 1;
            }
        }
        reached
    }

    /// Drop every subscription, as a broker-side connection close would
    pub fn disconnect(&self) {
        lock(&self.state.bindings).clear();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl BrokerChannel for InMemoryBroker {
    async fn publish(&self, message: OutboundMessage) -> Result<(), TransportError> {
        if self.state.fail_publishes.load(Ordering::SeqCst) {
            return Err(TransportError::Publish("broker unavailable".to_string()));
        }

        let routing_key = message.routing_key.clone();
        let body = message.body.clone();
        lock(&self.state.published).push(message);
        self.deliver(&routing_key, body);
        Ok(())
    }
}

struct RecordingAcker {
    state: Arc<BrokerState>,
}

#[async_trait]
impl DeliveryAcker for RecordingAcker {
    async fn ack(&self, delivery_tag: u64) -> Result<(), TransportError> {
        lock(&self.state.settlements).push(Settlement::Acked(delivery_tag));
        Ok(())
    }

    async fn reject(&self, delivery_tag: u64, requeue: bool) -> Result<(), TransportError> {
        lock(&self.state.settlements).push(Settlement::Rejected { delivery_tag, requeue });
        Ok(())
    }
}

pub struct InMemorySubscription {
    receiver: mpsc::UnboundedReceiver<Delivery>,
    closed: bool,
}

#[async_trait]
impl Subscription for InMemorySubscription {
    async fn next_delivery(&mut self) -> Option<Result<Delivery, TransportError>> {
        if self.closed {
            return None;
        }
        self.receiver.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.closed = true;
        self.receiver.close();
        Ok(())
    }
}
