// Private module declaration
mod server;

use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry};

use crate::messaging::EventType;

// Re-export for public API
pub use server::start_metrics_server;

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Provides metrics for:
// - Inbound dispatch (throughput, latency, handler failures)
// - Delivery acknowledgement outcomes
// - Outbound publishing and the publisher circuit breaker
//
// All metrics are registered with Prometheus and can be scraped via /metrics
// ============================================================================

/// Dispatch label for routing keys outside the known event types
pub const OTHER_EVENT_TYPE: &str = "other";

/// Peers choose routing keys, so only known event types become label values
fn event_type_label(routing_key: &str) -> &'static str {
    routing_key
        .parse::<EventType>()
        .map(|event_type| event_type.as_str())
        .unwrap_or(OTHER_EVENT_TYPE)
}

/// Central metrics registry for the service
pub struct Metrics {
    registry: Registry,

    // Dispatch Metrics
    pub events_dispatched: IntCounterVec,
    pub dispatch_duration: HistogramVec,
    pub handler_failures: IntCounterVec,

    // Consumer Metrics
    pub deliveries: IntCounterVec,

    // Publisher Metrics
    pub events_published: IntCounterVec,
    pub publish_failures: IntCounterVec,
    pub circuit_breaker_state: IntGauge,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let events_dispatched = IntCounterVec::new(
            Opts::new("events_dispatched_total", "Inbound events dispatched to handlers"),
            &["event_type", "outcome"],
        )?;
        registry.register(Box::new(events_dispatched.clone()))?;

        let dispatch_duration = HistogramVec::new(
            HistogramOpts::new("dispatch_duration_seconds", "Time spent running all handlers for one event")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["event_type"],
        )?;
        registry.register(Box::new(dispatch_duration.clone()))?;

        let handler_failures = IntCounterVec::new(
            Opts::new("handler_failures_total", "Event handler invocations that failed"),
            &["handler"],
        )?;
        registry.register(Box::new(handler_failures.clone()))?;

        let deliveries = IntCounterVec::new(
            Opts::new("deliveries_total", "Broker deliveries by acknowledgement outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(deliveries.clone()))?;

        let events_published = IntCounterVec::new(
            Opts::new("events_published_total", "Events accepted by the broker"),
            &["event_type"],
        )?;
        registry.register(Box::new(events_published.clone()))?;

        let publish_failures = IntCounterVec::new(
            Opts::new("event_publish_failures_total", "Events that failed to publish"),
            &["event_type", "reason"],
        )?;
        registry.register(Box::new(publish_failures.clone()))?;

        let circuit_breaker_state = IntGauge::new(
            "publisher_circuit_breaker_state",
            "Publisher circuit breaker state (0=Closed, 1=Open, 2=HalfOpen)",
        )?;
        registry.register(Box::new(circuit_breaker_state.clone()))?;

        Ok(Self {
            registry,
            events_dispatched,
            dispatch_duration,
            handler_failures,
            deliveries,
            events_published,
            publish_failures,
            circuit_breaker_state,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_dispatch(&self, routing_key: &str, duration_secs: f64, success: bool) {
        let event_type = event_type_label(routing_key);
        let outcome = if success { "success" } else { "failure" };
        self.events_dispatched.with_label_values(&[event_type, outcome]).inc();
        self.dispatch_duration.with_label_values(&[event_type]).observe(duration_secs);
    }

    pub fn record_handler_failure(&self, handler: &str) {
        self.handler_failures.with_label_values(&[handler]).inc();
    }

    pub fn record_delivery(&self, acked: bool) {
        let outcome = if acked { "acked" } else { "rejected" };
        self.deliveries.with_label_values(&[outcome]).inc();
    }

    pub fn record_publish(&self, event_type: &str, error: Option<&str>) {
        match error {
            None => self.events_published.with_label_values(&[event_type]).inc(),
            Some(reason) => self.publish_failures.with_label_values(&[event_type, reason]).inc(),
        }
    }

    pub fn update_circuit_breaker_state(&self, state: u8) {
        self.circuit_breaker_state.set(state as i64);
    }
}
