//! HTTP API server for the subscription sagas.
//!
//! Exposes the lifecycle operations and read models over REST, with
//! structured logging (tracing) and Prometheus metrics. Every response uses
//! the `{ "success": bool, ... }` envelope.

pub mod config;
pub mod error;
pub mod routes;
pub mod seed;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use common::Clock;
use ledger::LedgerStore;
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{
    InMemoryBillingEngine, InMemoryJobQueue, InMemoryNotifier, InMemoryStorefront, SagaConfig,
    SubscriptionOrchestrator,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Orchestrator wired to the in-memory collaborators.
pub type Orchestrator<L> = SubscriptionOrchestrator<
    L,
    InMemoryBillingEngine,
    InMemoryStorefront,
    InMemoryJobQueue,
    InMemoryNotifier,
>;

/// Shared state for all route handlers.
///
/// The collaborator handles share state with the orchestrator's copies so
/// that callers can seed and inspect them.
pub struct AppState<L: LedgerStore> {
    pub orchestrator: Orchestrator<L>,
    pub billing: InMemoryBillingEngine,
    pub storefront: InMemoryStorefront,
    pub queue: InMemoryJobQueue,
    pub notifier: InMemoryNotifier,
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<L: LedgerStore + 'static>(
    state: Arc<AppState<L>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/swap-window", get(routes::subscriptions::swap_window::<L>))
        .route("/subscriptions", post(routes::subscriptions::create::<L>))
        .route(
            "/subscriptions/track",
            put(routes::subscriptions::update_track::<L>),
        )
        .route(
            "/subscriptions/term",
            put(routes::subscriptions::update_term::<L>),
        )
        .route(
            "/subscriptions/cancel-all",
            post(routes::subscriptions::cancel_all::<L>),
        )
        .route(
            "/subscriptions/{id}/cancel",
            post(routes::subscriptions::cancel::<L>),
        )
        .route(
            "/subscriptions/{id}/reactivate",
            post(routes::subscriptions::reactivate::<L>),
        )
        .route(
            "/subscriptions/{id}/swap",
            post(routes::subscriptions::swap::<L>),
        )
        .route(
            "/subscriptions/{id}/invoice",
            get(routes::subscriptions::invoice::<L>),
        )
        .route("/customers", get(routes::customers::find_by_email::<L>))
        .route(
            "/customers/{id}/subscriptions",
            get(routes::customers::subscriptions::<L>),
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

/// Creates the default application state over `ledger` with in-memory
/// billing, storefront, queue and notifier.
pub fn create_default_state<L: LedgerStore>(
    ledger: L,
    config: SagaConfig,
    clock: Arc<dyn Clock>,
) -> Arc<AppState<L>> {
    let billing = InMemoryBillingEngine::new();
    let storefront = InMemoryStorefront::new();
    let queue = InMemoryJobQueue::new();
    let notifier = InMemoryNotifier::new();

    let orchestrator = SubscriptionOrchestrator::new(
        ledger,
        billing.clone(),
        storefront.clone(),
        queue.clone(),
        notifier.clone(),
        clock,
        config,
    );

    Arc::new(AppState {
        orchestrator,
        billing,
        storefront,
        queue,
        notifier,
    })
}
