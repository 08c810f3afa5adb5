mod monitor;
mod status;

pub use monitor::{
    report_health, GetSystemHealth, HealthMonitorActor, SystemHealth, UpdateHealth, PUBLISHER_COMPONENT,
};
pub use status::{overall_status, ComponentHealth, HealthStatus};
