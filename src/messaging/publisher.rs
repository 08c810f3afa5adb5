use std::sync::Arc;
use std::time::Duration;

use crate::domain::Customer;
use crate::metrics::Metrics;
use crate::utils::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState};

use super::envelope::{CustomerEvent, EventType, OutboundEvent};
use super::transport::{BrokerChannel, OutboundMessage, TransportError};

// ============================================================================
// Event Publisher
// ============================================================================
//
// Serializes an envelope to JSON and sends it to the exchange with the
// event type as routing key.
//
// The caller only learns about transport-level failures: an unroutable
// message is silently dropped by the broker. Every publish is bounded by a
// deadline and protected by a circuit breaker.
//
// ============================================================================

pub const DEFAULT_EXCHANGE: &str = "events";
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);
const CONTENT_TYPE_JSON: &str = "application/json";

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Failed to serialize event: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl PublishError {
    fn reason(&self) -> &'static str {
        match self {
            PublishError::Serialization(_) => "serialization",
            PublishError::Transport(e) => e.reason(),
        }
    }
}

pub struct Publisher {
    channel: Arc<dyn BrokerChannel>,
    exchange: String,
    timeout: Duration,
    circuit_breaker: CircuitBreaker,
    metrics: Option<Arc<Metrics>>,
}

impl Publisher {
    pub fn new(channel: Arc<dyn BrokerChannel>) -> Self {
        Self {
            channel,
            exchange: DEFAULT_EXCHANGE.to_string(),
            timeout: DEFAULT_PUBLISH_TIMEOUT,
            circuit_breaker: CircuitBreaker::new(CircuitBreakerConfig::default()),
            metrics: None,
        }
    }

    pub fn with_exchange(mut self, exchange: impl Into<String>) -> Self {
        self.exchange = exchange.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = CircuitBreaker::new(config);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    pub async fn circuit_state(&self) -> CircuitState {
        self.circuit_breaker.get_state().await
    }

    /// Publish an envelope, routed by its event type
    pub async fn publish<E: OutboundEvent>(&self, event: &E) -> Result<(), PublishError> {
        let event_type = event.event_type();
        let result = self.send(event_type, event).await;

        if let Some(metrics) = &self.metrics {
            metrics.record_publish(event_type.as_str(), result.as_ref().err().map(PublishError::reason));
            metrics.update_circuit_breaker_state(self.circuit_state().await.as_gauge());
        }

        match &result {
            Ok(()) => {
                tracing::info!(
                    event_type = %event_type,
                    exchange = %self.exchange,
                    "Published event"
                );
            }
            Err(e) => {
                tracing::error!(
                    event_type = %event_type,
                    exchange = %self.exchange,
                    error = %e,
                    "Failed to publish event"
                );
            }
        }

        result
    }

    /// Build a `CustomerEvent` stamped with the current time and publish it
    pub async fn publish_customer_event(
        &self,
        event_type: EventType,
        customer: &Customer,
    ) -> Result<(), PublishError> {
        let event = CustomerEvent::new(event_type, customer.clone());
        self.publish(&event).await?;

        tracing::debug!(
            event_type = %event_type,
            customer_id = customer.id,
            "Customer event sent"
        );
        Ok(())
    }

    async fn send<E: OutboundEvent>(&self, event_type: EventType, event: &E) -> Result<(), PublishError> {
        let body = serde_json::to_vec(event)?;
        let message = OutboundMessage {
            exchange: self.exchange.clone(),
            routing_key: event_type.as_str().to_string(),
            content_type: CONTENT_TYPE_JSON.to_string(),
            body,
        };

        let timeout_ms = self.timeout.as_millis() as u64;
        let deadline = self.timeout;
        let channel = self.channel.clone();

        let result = self
            .circuit_breaker
            .call(async move {
                match tokio::time::timeout(deadline, channel.publish(message)).await {
                    Ok(sent) => sent,
                    Err(_) => Err(TransportError::Timeout(timeout_ms)),
                }
            })
            .await;

        match result {
            Ok(()) => Ok(()),
            Err(CircuitBreakerError::CircuitOpen) => Err(TransportError::CircuitOpen.into()),
            Err(CircuitBreakerError::OperationFailed(e)) => Err(e.into()),
        }
    }
}
