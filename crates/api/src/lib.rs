//! HTTP API for order fulfillment.
//!
//! A thin axum adapter over [`saga::OrderService`], with structured logging
//! (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use order_store::{InMemoryOrderStore, InMemorySagaJournal, OrderStore, SagaJournal};
use saga::{InventoryGateway, OrderService, SagaConfig};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::orders::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<G, S, J>(
    state: Arc<AppState<G, S, J>>,
    metrics_handle: PrometheusHandle,
) -> Router
where
    G: InventoryGateway + 'static,
    S: OrderStore + 'static,
    J: SagaJournal + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/orders",
            get(routes::orders::list::<G, S, J>).post(routes::orders::create::<G, S, J>),
        )
        .route(
            "/orders/{id}",
            get(routes::orders::get::<G, S, J>).patch(routes::orders::update_status::<G, S, J>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Application state over the given collaborators.
pub fn create_state<G, S, J>(
    gateway: G,
    store: S,
    journal: J,
    config: SagaConfig,
) -> Arc<AppState<G, S, J>>
where
    G: InventoryGateway,
    S: OrderStore,
    J: SagaJournal,
{
    Arc::new(AppState {
        service: OrderService::new(gateway, store, journal, config),
    })
}

/// Application state that keeps orders and the saga journal in memory.
pub fn create_in_memory_state<G: InventoryGateway>(
    gateway: G,
    config: SagaConfig,
) -> Arc<AppState<G, InMemoryOrderStore, InMemorySagaJournal>> {
    create_state(
        gateway,
        InMemoryOrderStore::new(),
        InMemorySagaJournal::new(),
        config,
    )
}
