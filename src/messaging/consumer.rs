use kameo::actor::ActorRef;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

use crate::health::{report_health, HealthMonitorActor, HealthStatus};
use crate::metrics::Metrics;
use crate::routing::EventRouter;

use super::transport::{Delivery, Subscription, TransportError};

// ============================================================================
// Consumer Loop
// ============================================================================
//
// Pulls deliveries from one subscription and dispatches each through the
// router, one at a time:
// - every matching handler succeeded (or none matched) -> ack
// - any handler failed                                 -> reject (requeue)
//
// Shutdown is observed only between deliveries. A delivery that has been
// received is always dispatched and settled before the loop stops, so there
// is no partial dispatch.
//
// Idle -> AwaitingDelivery -> Dispatching -> Acked | Rejected -> AwaitingDelivery ...
// any state -> Stopped on shutdown or broker disconnect
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Idle,
    AwaitingDelivery,
    Dispatching,
    Acked,
    Rejected,
    Stopped,
}

impl fmt::Display for ConsumerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConsumerState::Idle => "idle",
            ConsumerState::AwaitingDelivery => "awaiting_delivery",
            ConsumerState::Dispatching => "dispatching",
            ConsumerState::Acked => "acked",
            ConsumerState::Rejected => "rejected",
            ConsumerState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Counters returned when the loop stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub received: u64,
    pub acked: u64,
    pub rejected: u64,
}

enum Next {
    Shutdown,
    Delivery(Delivery),
    Closed,
    Failed(TransportError),
}

pub struct ConsumerLoop {
    name: String,
    router: Arc<EventRouter>,
    subscription: Box<dyn Subscription>,
    shutdown: watch::Receiver<bool>,
    requeue_on_failure: bool,
    metrics: Option<Arc<Metrics>>,
    health: Option<ActorRef<HealthMonitorActor>>,
    state: ConsumerState,
    stats: ConsumerStats,
}

impl ConsumerLoop {
    pub fn new(
        name: impl Into<String>,
        router: Arc<EventRouter>,
        subscription: Box<dyn Subscription>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            name: name.into(),
            router,
            subscription,
            shutdown,
            requeue_on_failure: true,
            metrics: None,
            health: None,
            state: ConsumerState::Idle,
            stats: ConsumerStats::default(),
        }
    }

    /// Whether a rejected delivery goes back to the queue
    pub fn with_requeue_on_failure(mut self, requeue: bool) -> Self {
        self.requeue_on_failure = requeue;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_health_monitor(mut self, health: ActorRef<HealthMonitorActor>) -> Self {
        self.health = Some(health);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Consume until shutdown is signalled or the broker goes away.
    ///
    /// Returns the stats on a clean stop and the transport error when the
    /// connection is lost or a settlement fails.
    pub async fn run(mut self) -> Result<ConsumerStats, TransportError> {
        tracing::info!(
            consumer = %self.name,
            requeue_on_failure = self.requeue_on_failure,
            "📥 Consumer loop started"
        );
        report_health(self.health.as_ref(), &self.name, HealthStatus::Healthy).await;

        let outcome = self.consume().await;

        if let Err(e) = self.subscription.close().await {
            tracing::warn!(consumer = %self.name, error = %e, "Failed to close subscription");
        }
        self.transition(ConsumerState::Stopped);

        match &outcome {
            Ok(()) => {
                report_health(
                    self.health.as_ref(),
                    &self.name,
                    HealthStatus::Degraded("consumer stopped".to_string()),
                )
                .await;
                tracing::info!(
                    consumer = %self.name,
                    received = self.stats.received,
                    acked = self.stats.acked,
                    rejected = self.stats.rejected,
                    "🛑 Consumer loop stopped"
                );
            }
            Err(e) => {
                report_health(self.health.as_ref(), &self.name, HealthStatus::Unhealthy(e.to_string())).await;
                tracing::error!(consumer = %self.name, error = %e, "Consumer loop aborted");
            }
        }

        outcome.map(|()| self.stats)
    }

    async fn consume(&mut self) -> Result<(), TransportError> {
        loop {
            self.transition(ConsumerState::AwaitingDelivery);

            let next = tokio::select! {
                biased;

                _ = wait_for_shutdown(&mut self.shutdown) => Next::Shutdown,
                next = self.subscription.next_delivery() => match next {
                    Some(Ok(delivery)) => Next::Delivery(delivery),
                    Some(Err(e)) => Next::Failed(e),
                    None => Next::Closed,
                },
            };

            match next {
                Next::Shutdown => {
                    tracing::debug!(consumer = %self.name, "Shutdown signal received");
                    return Ok(());
                }
                Next::Delivery(delivery) => self.process(delivery).await?,
                Next::Closed => {
                    return Err(TransportError::Connection(
                        "subscription closed by broker".to_string(),
                    ));
                }
                Next::Failed(e) => return Err(e),
            }
        }
    }

    async fn process(&mut self, delivery: Delivery) -> Result<(), TransportError> {
        self.stats.received += 1;
        self.transition(ConsumerState::Dispatching);

        tracing::debug!(
            consumer = %self.name,
            routing_key = %delivery.routing_key,
            delivery_tag = delivery.delivery_tag,
            redelivered = delivery.redelivered,
            "Received delivery"
        );

        let dispatched = self.router.dispatch(&delivery.routing_key, &delivery.body).await;

        match dispatched {
            Ok(report) => {
                tracing::debug!(
                    consumer = %self.name,
                    routing_key = %report.routing_key,
                    handlers = report.invoked,
                    "Delivery processed, acking"
                );
                delivery.ack().await?;
                self.stats.acked += 1;
                self.record_delivery(true);
                self.transition(ConsumerState::Acked);
            }
            Err(e) => {
                tracing::warn!(
                    consumer = %self.name,
                    routing_key = %e.routing_key,
                    failed = e.failures.len(),
                    requeue = self.requeue_on_failure,
                    error = %e,
                    "Delivery failed, rejecting"
                );
                delivery.reject(self.requeue_on_failure).await?;
                self.stats.rejected += 1;
                self.record_delivery(false);
                self.transition(ConsumerState::Rejected);
            }
        }

        Ok(())
    }

    fn record_delivery(&self, acked: bool) {
        if let Some(metrics) = &self.metrics {
            metrics.record_delivery(acked);
        }
    }

    fn transition(&mut self, next: ConsumerState) {
        tracing::trace!(consumer = %self.name, from = %self.state, to = %next, "Consumer state");
        self.state = next;
    }
}

/// Resolves once shutdown is requested, or the sender is gone
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::GetSystemHealth;
    use crate::messaging::memory::{InMemoryBroker, Settlement};
    use crate::routing::{HandlerError, HandlerRegistry};
    use kameo::Actor;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn router() -> Arc<EventRouter> {
        let mut registry = HandlerRegistry::new();
        registry
            .register_fn("order.*", "order_parser", |body: Vec<u8>| async move {
                serde_json::from_slice::<serde_json::Value>(&body)?;
                Ok::<(), HandlerError>(())
            })
            .unwrap();
        Arc::new(EventRouter::new(registry))
    }

    async fn wait_for_settlements(broker: &InMemoryBroker, count: usize) {
        for _ in 0..200 {
            if broker.settlements().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {} settlements, got {:?}", count, broker.settlements());
    }

    #[tokio::test]
    async fn test_acks_success_and_rejects_failure() {
        let broker = InMemoryBroker::new();
        let subscription = broker.subscribe(&["#".to_string()]).unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let metrics = Arc::new(Metrics::new().unwrap());

        let consumer = ConsumerLoop::new("consumer-0", router(), Box::new(subscription), shutdown_rx)
            .with_metrics(metrics.clone());
        let handle = tokio::spawn(consumer.run());

        broker.deliver("order.created", r#"{"id": 1}"#);
        broker.deliver("order.created", "not json");
        broker.deliver("customer.created", "anything");
        wait_for_settlements(&broker, 3).await;

        shutdown_tx.send(true).unwrap();
        let stats = handle.await.unwrap().unwrap();

        assert_eq!(
            stats,
            ConsumerStats {
                received: 3,
                acked: 2,
                rejected: 1
            }
        );
        assert_eq!(
            broker.settlements(),
            vec![
                Settlement::Acked(1),
                Settlement::Rejected {
                    delivery_tag: 2,
                    requeue: true
                },
                Settlement::Acked(3),
            ]
        );
        assert_eq!(metrics.deliveries.with_label_values(&["rejected"]).get(), 1);
    }

    #[tokio::test]
    async fn test_requeue_can_be_disabled() {
        let broker = InMemoryBroker::new();
        let subscription = broker.subscribe(&["#".to_string()]).unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let consumer = ConsumerLoop::new("consumer-0", router(), Box::new(subscription), shutdown_rx)
            .with_requeue_on_failure(false);
        let handle = tokio::spawn(consumer.run());

        broker.deliver("order.updated", "{");
        wait_for_settlements(&broker, 1).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();

        assert_eq!(
            broker.settlements(),
            vec![Settlement::Rejected {
                delivery_tag: 1,
                requeue: false
            }]
        );
    }

    #[tokio::test]
    async fn test_shutdown_wins_over_pending_deliveries() {
        let broker = InMemoryBroker::new();
        let subscription = broker.subscribe(&["#".to_string()]).unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        broker.deliver("order.created", "{}");
        broker.deliver("order.created", "{}");
        shutdown_tx.send(true).unwrap();

        let stats = ConsumerLoop::new("consumer-0", router(), Box::new(subscription), shutdown_rx)
            .run()
            .await
            .unwrap();

        assert_eq!(stats, ConsumerStats::default());
        assert!(broker.settlements().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_in_flight_delivery() {
        let started = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));
        let mut registry = HandlerRegistry::new();
        let (started_flag, finished_flag) = (started.clone(), finished.clone());
        registry
            .register_fn("#", "slow", move |_body: Vec<u8>| {
                let (started, finished) = (started_flag.clone(), finished_flag.clone());
                async move {
                    started.store(true, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    finished.store(true, Ordering::SeqCst);
                    Ok::<(), HandlerError>(())
                }
            })
            .unwrap();

        let broker = InMemoryBroker::new();
        let subscription = broker.subscribe(&["#".to_string()]).unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let consumer = ConsumerLoop::new(
            "consumer-0",
            Arc::new(EventRouter::new(registry)),
            Box::new(subscription),
            shutdown_rx,
        );
        let handle = tokio::spawn(consumer.run());

        broker.deliver("order.created", "{}");
        while !started.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        shutdown_tx.send(true).unwrap();

        let stats = handle.await.unwrap().unwrap();
        assert!(finished.load(Ordering::SeqCst));
        assert_eq!(
            stats,
            ConsumerStats {
                received: 1,
                acked: 1,
                rejected: 0
            }
        );
        assert_eq!(broker.settlements(), vec![Settlement::Acked(1)]);
    }

    #[tokio::test]
    async fn test_broker_disconnect_is_reported() {
        let broker = InMemoryBroker::new();
        let subscription = broker.subscribe(&["#".to_string()]).unwrap();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let monitor = HealthMonitorActor::spawn(HealthMonitorActor::new(None));

        let consumer = ConsumerLoop::new("consumer-0", router(), Box::new(subscription), shutdown_rx)
            .with_health_monitor(monitor.clone());
        let handle = tokio::spawn(consumer.run());

        broker.disconnect();
        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, TransportError::Connection(_)));

        let health = monitor.ask(GetSystemHealth).await.unwrap();
        assert!(health.components["consumer-0"].status.is_unhealthy());
    }

    #[tokio::test]
    async fn test_dropped_shutdown_sender_stops_loop() {
        let broker = InMemoryBroker::new();
        let subscription = broker.subscribe(&["#".to_string()]).unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        drop(shutdown_tx);

        let stats = ConsumerLoop::new("consumer-0", router(), Box::new(subscription), shutdown_rx)
            .run()
            .await
            .unwrap();
        assert_eq!(stats.received, 0);
    }
}
