use chrono::{DateTime, Utc};
use serde::Serialize;

// ============================================================================
// Health Check Abstractions
// ============================================================================

/// Health status of a component
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded(String),
    Unhealthy(String),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    pub fn is_unhealthy(&self) -> bool {
        matches!(self, HealthStatus::Unhealthy(_))
    }
}

/// Health information for a component
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    pub last_check: DateTime<Utc>,
    pub details: Option<String>,
}

impl ComponentHealth {
    pub fn new(name: impl Into<String>, status: HealthStatus) -> Self {
        Self {
            name: name.into(),
            status,
            last_check: Utc::now(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Worst status wins: any unhealthy component makes the system unhealthy,
/// otherwise any degraded component makes it degraded.
pub fn overall_status<'a>(components: impl IntoIterator<Item = &'a ComponentHealth>) -> HealthStatus {
    let mut degraded = false;
    let mut unhealthy = Vec::new();

    for health in components {
        match &health.status {
            HealthStatus::Unhealthy(msg) => unhealthy.push(format!("{}: {}", health.name, msg)),
            HealthStatus::Degraded(_) => degraded = true,
            HealthStatus::Healthy => {}
        }
    }

    if !unhealthy.is_empty() {
        unhealthy.sort();
        HealthStatus::Unhealthy(unhealthy.join(", "))
    } else if degraded {
        HealthStatus::Degraded("Some components degraded".to_string())
    } else {
        HealthStatus::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overall_status_worst_wins() {
        let healthy = ComponentHealth::new("publisher", HealthStatus::Healthy);
        let degraded = ComponentHealth::new("consumer", HealthStatus::Degraded("stopping".into()));
        let down = ComponentHealth::new("broker", HealthStatus::Unhealthy("connection lost".into()));

        assert!(overall_status([&healthy]).is_healthy());
        assert_eq!(
            overall_status([&healthy, &degraded]),
            HealthStatus::Degraded("Some components degraded".to_string())
        );
        assert_eq!(
            overall_status([&healthy, &degraded, &down]),
            HealthStatus::Unhealthy("broker: connection lost".to_string())
        );
    }

    #[test]
    fn test_status_serializes_with_reason() {
        let json = serde_json::to_value(HealthStatus::Degraded("half-open".into())).unwrap();
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["reason"], "half-open");
    }
}
