pub mod circuit_breakers;
pub mod deliveries;
pub mod events;
pub mod health;
pub mod receive;
pub mod schemas;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use hookline_gateway::{WebhookDispatcher, WebhookMetrics, WebhookReceiver};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Outbound delivery engine. Cheap to clone.
    pub dispatcher: WebhookDispatcher,
    /// Inbound ingestion pipeline.
    pub receiver: Arc<WebhookReceiver>,
    /// Counters shared by the dispatcher and receiver.
    pub metrics: Arc<WebhookMetrics>,
}

/// Build the Axum router with all routes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        // Inbound webhooks
        .route("/receive/{source}", post(receive::receive))
        .route("/receive/provider/{name}", post(receive::receive_provider))
        // Outbound deliveries
        .route("/v1/events", post(events::publish))
        .route("/v1/deliveries/{id}", get(deliveries::get_delivery))
        .route("/v1/deliveries/{id}/retry", post(deliveries::retry))
        .route("/v1/deliveries/{id}/cancel", post(deliveries::cancel))
        .route("/v1/stats", get(deliveries::stats))
        // Circuit breaker admin
        .route(
            "/admin/circuit-breakers",
            get(circuit_breakers::list_circuit_breakers),
        )
        .route(
            "/admin/circuit-breakers/open",
            post(circuit_breakers::open_circuit_breaker),
        )
        .route(
            "/admin/circuit-breakers/close",
            post(circuit_breakers::close_circuit_breaker),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
