use kameo::Actor;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use customer_events::config::Config;
use customer_events::handlers::setup_event_handlers;
use customer_events::health::HealthMonitorActor;
use customer_events::messaging::{AmqpBroker, ConsumerLoop, Publisher};
use customer_events::metrics::{self, Metrics};
use customer_events::routing::EventRouter;
use customer_events::service::CustomerService;
use customer_events::store::{CustomerRepository, InMemoryStore, PgStore, ProjectionStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with environment-based filtering
    // Default to INFO level, can be overridden with RUST_LOG env var
    // Example: RUST_LOG=customer_events=trace cargo run
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,customer_events=debug"))
        )
        .init();

    tracing::info!("🚀 Starting customers event service");

    let config = Config::from_env();

    // === 1. Persistence ===
    let (customers, projections): (Arc<dyn CustomerRepository>, Arc<dyn ProjectionStore>) =
        match &config.database_dsn {
            Some(dsn) => {
                tracing::info!("Connecting to Postgres...");
                let store = Arc::new(PgStore::connect(dsn, config.database_max_connections).await?);
                (store.clone(), store)
            }
            None => {
                tracing::warn!("DATABASE_DSN not set, keeping records in memory");
                let store = Arc::new(InMemoryStore::new());
                (store.clone(), store)
            }
        };

    // === 2. Prometheus metrics ===
    let metrics = Arc::new(Metrics::new()?);
    tracing::info!("📊 Metrics registry created with {} metrics", metrics.registry().gather().len());

    // === 3. Handler registry, fixed before any consumer starts ===
    let registry = setup_event_handlers(projections.clone())?;
    let router = Arc::new(EventRouter::new(registry).with_metrics(metrics.clone()));

    // === 4. Broker connection and publisher ===
    let broker = if config.amqp.disabled {
        tracing::warn!("DISABLE_RABBITMQ set, events will be neither consumed nor published");
        None
    } else {
        Some(AmqpBroker::connect(&config.amqp.url, &config.amqp.exchange).await?)
    };

    let publisher = match &broker {
        Some(broker) => Some(Arc::new(
            Publisher::new(Arc::new(broker.publisher_channel().await?))
                .with_exchange(broker.exchange())
                .with_timeout(config.amqp.publish_timeout)
                .with_metrics(metrics.clone()),
        )),
        None => None,
    };

    // === 5. Health monitor and metrics server ===
    let health = HealthMonitorActor::spawn(HealthMonitorActor::new(publisher.clone()));

    // actix-web gets its own thread and system
    let metrics_registry = Arc::new(metrics.registry().clone());
    let server_health = health.clone();
    let metrics_port = config.metrics_port;
    std::thread::spawn(move || {
        let system = actix_web::rt::System::new();
        let served = system.block_on(metrics::start_metrics_server(
            metrics_registry,
            Some(server_health),
            metrics_port,
        ));
        if let Err(e) = served {
            tracing::error!("Metrics server error: {}", e);
        }
    });

    // === 6. Consumer loops, one channel each ===
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut consumers = Vec::new();

    if let Some(broker) = &broker {
        let binding_keys = router.patterns();
        for index in 0..config.amqp.consumers {
            let subscription = broker
                .subscribe(&config.amqp.queue, &binding_keys, config.amqp.prefetch)
                .await?;

            let consumer = ConsumerLoop::new(
                format!("consumer-{}", index),
                router.clone(),
                Box::new(subscription),
                shutdown_rx.clone(),
            )
            .with_requeue_on_failure(config.amqp.requeue_on_failure)
            .with_metrics(metrics.clone())
            .with_health_monitor(health.clone());

            consumers.push(tokio::spawn(consumer.run()));
        }
    }

    // === 7. Customer service for the HTTP layer ===
    let service = CustomerService::new(customers, projections, publisher);
    tracing::info!(
        customers = service.list().await?.len(),
        consumers = consumers.len(),
        "✅ Customer service ready"
    );

    // === 8. Run until interrupted ===
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested, draining consumers");
    let _ = shutdown_tx.send(true);

    for handle in consumers {
        match handle.await {
            Ok(Ok(stats)) => tracing::info!(
                received = stats.received,
                acked = stats.acked,
                rejected = stats.rejected,
                "Consumer drained"
            ),
            Ok(Err(e)) => tracing::error!(error = %e, "Consumer ended with error"),
            Err(e) => tracing::error!(error = %e, "Consumer task panicked"),
        }
    }

    if let Some(broker) = broker {
        if let Err(e) = broker.close().await {
            tracing::warn!(error = %e, "Failed to close broker connection");
        }
    }

    tracing::info!("🎉 Shutdown complete");
    Ok(())
}
