// ============================================================================
// customer_events - event routing and dispatch for the customers service
// ============================================================================
//
// Inbound:  broker -> ConsumerLoop -> EventRouter -> TopicPattern match -> handlers -> store
// Outbound: CustomerService -> Publisher -> topic exchange `events`
//
// Modules, leaf to root:
// - routing/    - topic matching, handler registry, dispatch
// - domain/     - customer record and upstream projections
// - store/      - persistence ports (in-memory, Postgres)
// - messaging/  - envelopes, broker transport, publisher, consumer loop
// - handlers/   - projection handlers and the debug catch-all
// - service/    - customer operations with best-effort publishing
// - health/     - component health aggregation (kameo actor)
// - metrics/    - Prometheus metrics and the /metrics, /health server
// - utils/      - retry and circuit breaker
//
// ============================================================================

pub mod config;
pub mod domain;
pub mod handlers;
pub mod health;
pub mod messaging;
pub mod metrics;
pub mod routing;
pub mod service;
pub mod store;
pub mod utils;
