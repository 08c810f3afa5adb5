use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use kameo::actor::ActorRef;
use prometheus::{Encoder, Registry, TextEncoder};
use std::sync::Arc;

use crate::health::{GetSystemHealth, HealthMonitorActor, HealthStatus};

const SERVICE_NAME: &str = "customer-events";

struct ServerState {
    registry: Arc<Registry>,
    health: Option<ActorRef<HealthMonitorActor>>,
}

/// Start the metrics HTTP server
/// This should be called in a separate thread/runtime to avoid conflicts
pub async fn start_metrics_server(
    registry: Arc<Registry>,
    health: Option<ActorRef<HealthMonitorActor>>,
    port: u16,
) -> std::io::Result<()> {
    tracing::info!("📊 Starting metrics server on http://0.0.0.0:{}/metrics", port);

    let state = web::Data::new(ServerState { registry, health });

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .route("/metrics", web::get().to(metrics_handler))
            .route("/health", web::get().to(health_handler))
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}

async fn metrics_handler(state: web::Data<ServerState>) -> impl Responder {
    let encoder = TextEncoder::new();
    let metric_families = state.registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return HttpResponse::InternalServerError().body(e.to_string());
    }

    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(buffer)
}

async fn health_handler(state: web::Data<ServerState>) -> impl Responder {
    let Some(monitor) = &state.health else {
        return HttpResponse::Ok().json(serde_json::json!({
            "status": "healthy",
            "service": SERVICE_NAME
        }));
    };

    match monitor.ask(GetSystemHealth).await {
        Ok(health) => {
            let body = serde_json::json!({
                "status": health.overall_status,
                "service": SERVICE_NAME,
                "components": health.components,
                "check_time": health.check_time,
            });
            if health.overall_status.is_unhealthy() {
                HttpResponse::ServiceUnavailable().json(body)
            } else {
                HttpResponse::Ok().json(body)
            }
        }
        Err(e) => {
            tracing::warn!(error = ?e, "Health monitor did not answer");
            HttpResponse::ServiceUnavailable().json(serde_json::json!({
                "status": HealthStatus::Unhealthy("health monitor unavailable".to_string()),
                "service": SERVICE_NAME
            }))
        }
    }
}
