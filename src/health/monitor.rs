use chrono::Utc;
use kameo::actor::ActorRef;
use kameo::error::Infallible;
use kameo::message::{Context, Message};
use kameo::reply::{Reply, ReplyError};
use kameo::Actor;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::messaging::Publisher;
use crate::utils::CircuitState;

use super::status::{overall_status, ComponentHealth, HealthStatus};

// ============================================================================
// Health Monitor Actor - Aggregates component health
// ============================================================================
//
// Responsibilities:
// - Track the health reported by consumer loops
// - Poll the publisher's circuit breaker
// - Aggregate system-wide health for the /health endpoint
//
// ============================================================================

pub const PUBLISHER_COMPONENT: &str = "publisher";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

// ============================================================================
// Messages
// ============================================================================

#[derive(Debug)]
pub struct UpdateHealth {
    pub component: String,
    pub status: HealthStatus,
    pub details: Option<String>,
}

impl UpdateHealth {
    pub fn new(component: impl Into<String>, status: HealthStatus) -> Self {
        Self {
            component: component.into(),
            status,
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

#[derive(Debug)]
pub struct GetSystemHealth;

#[derive(Debug, Clone, Serialize)]
pub struct SystemHealth {
    pub overall_status: HealthStatus,
    pub components: BTreeMap<String, ComponentHealth>,
    pub check_time: chrono::DateTime<Utc>,
}

impl Reply for SystemHealth {
    type Ok = Self;
    type Error = Infallible;
    type Value = Self;

    fn to_result(self) -> Result<Self, Infallible> {
        Ok(self)
    }

    fn into_any_err(self) -> Option<Box<dyn ReplyError>> {
        None
    }

    fn into_value(self) -> Self::Value {
        self
    }
}

// ============================================================================
// Health Monitor Actor
// ============================================================================

pub struct HealthMonitorActor {
    components: BTreeMap<String, ComponentHealth>,
    publisher: Option<Arc<Publisher>>,
    poll_interval: Duration,
}

impl HealthMonitorActor {
    pub fn new(publisher: Option<Arc<Publisher>>) -> Self {
        Self {
            components: BTreeMap::new(),
            publisher,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

fn circuit_health(state: CircuitState) -> HealthStatus {
    match state {
        CircuitState::Closed => HealthStatus::Healthy,
        CircuitState::HalfOpen => HealthStatus::Degraded("Circuit breaker half-open".to_string()),
        CircuitState::Open => HealthStatus::Unhealthy("Circuit breaker open".to_string()),
    }
}

impl Actor for HealthMonitorActor {
    type Args = Self;
    type Error = Infallible;

    async fn on_start(state: Self::Args, actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        tracing::info!("HealthMonitorActor started");

        if let Some(publisher) = state.publisher.clone() {
            let poll_interval = state.poll_interval;
            let weak_ref = actor_ref.downgrade();

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(poll_interval);
                loop {
                    interval.tick().await;

                    let Some(actor_ref) = weak_ref.upgrade() else {
                        break;
                    };
                    let status = circuit_health(publisher.circuit_state().await);
                    let update = UpdateHealth::new(PUBLISHER_COMPONENT, status)
                        .with_details(format!("exchange {}", publisher.exchange()));

                    if actor_ref
                        .tell(update)
                        .send()
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
            });
        }

        Ok(state)
    }
}

// ============================================================================
// Message Handlers
// ============================================================================

impl Message<UpdateHealth> for HealthMonitorActor {
    type Reply = ();

    async fn handle(&mut self, msg: UpdateHealth, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        let mut health = ComponentHealth::new(msg.component.clone(), msg.status.clone());
        if let Some(details) = msg.details {
            health = health.with_details(details);
        }

        tracing::debug!(
            component = %msg.component,
            status = ?msg.status,
            "Updated component health"
        );

        self.components.insert(msg.component, health);
    }
}

impl Message<GetSystemHealth> for HealthMonitorActor {
    type Reply = SystemHealth;

    async fn handle(&mut self, _msg: GetSystemHealth, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        SystemHealth {
            overall_status: overall_status(self.components.values()),
            components: self.components.clone(),
            check_time: Utc::now(),
        }
    }
}

/// Fire-and-forget health report; a stopped monitor is not an error
pub async fn report_health(monitor: Option<&ActorRef<HealthMonitorActor>>, component: &str, status: HealthStatus) {
    if let Some(monitor) = monitor {
        if let Err(e) = monitor.tell(UpdateHealth::new(component, status)).send().await {
            tracing::debug!(component = %component, error = ?e, "Health monitor unavailable");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CustomerInput;
    use crate::messaging::memory::InMemoryBroker;
    use crate::messaging::EventType;
    use crate::utils::CircuitBreakerConfig;

    #[tokio::test]
    async fn test_aggregates_reported_components() {
        let monitor = HealthMonitorActor::spawn(HealthMonitorActor::new(None));

        report_health(Some(&monitor), "consumer-0", HealthStatus::Healthy).await;
        report_health(
            Some(&monitor),
            "consumer-1",
            HealthStatus::Unhealthy("connection lost".to_string()),
        )
        .await;

        let health = monitor.ask(GetSystemHealth).await.unwrap();
        assert_eq!(health.components.len(), 2);
        assert_eq!(
            health.overall_status,
            HealthStatus::Unhealthy("consumer-1: connection lost".to_string())
        );
    }

    #[tokio::test]
    async fn test_polls_publisher_circuit() {
        let broker = InMemoryBroker::new();
        broker.fail_publishes(true);
        let publisher = Arc::new(Publisher::new(Arc::new(broker)).with_circuit_breaker(CircuitBreakerConfig {
            failure_threshold: 1,
            timeout: Duration::from_secs(60),
            success_threshold: 1,
        }));

        let customer = CustomerInput {
            username: "jdoe".to_string(),
            ..Default::default()
        }
        .normalize()
        .into_customer(1);
        let _ = publisher.publish_customer_event(EventType::CustomerCreated, &customer).await;

        let monitor = HealthMonitorActor::spawn(
            HealthMonitorActor::new(Some(publisher)).with_poll_interval(Duration::from_millis(10)),
        );
        tokio::time::sleep(Duration::from_millis(100)).await;

        let health = monitor.ask(GetSystemHealth).await.unwrap();
        let publisher_health = &health.components[PUBLISHER_COMPONENT];
        assert!(publisher_health.status.is_unhealthy());
        assert_eq!(publisher_health.details.as_deref(), Some("exchange events"));
        assert_eq!(health.components.len(), 1);
    }
}
