use std::sync::Arc;
use std::time::Instant;

use crate::metrics::Metrics;

use super::errors::{DispatchError, HandlerFailure};
use super::registry::HandlerRegistry;
use super::topic::RoutingKey;

// ============================================================================
// Event Router
// ============================================================================
//
// Owns the (read-only) handler registry and runs every handler matching a
// routing key, one after another, in registry order.
//
// A failing handler never stops the remaining ones. The caller receives an
// aggregate outcome: success only if every matched handler succeeded.
//
// The router holds no locks; it can be shared by any number of consumer
// tasks through an Arc.
//
// ============================================================================

/// Summary of a successful dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub routing_key: String,
    pub invoked: usize,
}

pub struct EventRouter {
    registry: HandlerRegistry,
    metrics: Option<Arc<Metrics>>,
}

impl EventRouter {
    pub fn new(registry: HandlerRegistry) -> Self {
        Self {
            registry,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Binding keys for the broker subscription
    pub fn patterns(&self) -> Vec<String> {
        self.registry.patterns()
    }

    /// Run every handler matching `routing_key` against `body`
    pub async fn dispatch(
        &self,
        routing_key: &str,
        body: &[u8],
    ) -> Result<DispatchReport, DispatchError> {
        let key = RoutingKey::from(routing_key);
        let matched = self.registry.matching_handlers(&key);
        let started = Instant::now();

        if matched.is_empty() {
            tracing::debug!(
                routing_key = %key,
                "No handlers registered for routing key, skipping"
            );
            return Ok(DispatchReport {
                routing_key: key.to_string(),
                invoked: 0,
            });
        }

        let mut failures = Vec::new();

        for entry in &matched {
            let handler_name = entry.handler.name();

            match entry.handler.handle(body).await {
                Ok(()) => {
                    tracing::trace!(
                        routing_key = %key,
                        pattern = %entry.pattern,
                        handler = handler_name,
                        "Handler completed"
                    );
                }
                Err(error) => {
                    tracing::error!(
                        routing_key = %key,
                        pattern = %entry.pattern,
                        handler = handler_name,
                        error = %error,
                        "Event handler failed"
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics.record_handler_failure(handler_name);
                    }
                    failures.push(HandlerFailure {
                        handler: handler_name.to_string(),
                        pattern: entry.pattern.clone(),
                        error,
                    });
                }
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_dispatch(key.as_str(), started.elapsed().as_secs_f64(), failures.is_empty());
        }

        if failures.is_empty() {
            Ok(DispatchReport {
                routing_key: key.to_string(),
                invoked: matched.len(),
            })
        } else {
            Err(DispatchError {
                routing_key: key.to_string(),
                invoked: matched.len(),
                failures,
            })
        }
    }
}
