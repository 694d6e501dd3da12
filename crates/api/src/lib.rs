//! HTTP API server with observability for the shop checkout core.
//!
//! Provides REST endpoints for the cart, checkout and order history,
//! with structured logging (tracing) and Prometheus metrics.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use domain::{CartService, EventPublisher, OrderMaterializer, OrderQueryService};
use metrics_exporter_prometheus::PrometheusHandle;
use store::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state accessible from all handlers.
pub struct AppState<S: Store, P: EventPublisher> {
    pub store: S,
    pub carts: CartService<S>,
    pub checkout: OrderMaterializer<S, P>,
    pub orders: OrderQueryService<S>,
}

impl<S: Store + Clone, P: EventPublisher> AppState<S, P> {
    /// Wires every service to the same store.
    pub fn new(store: S, publisher: P) -> Self {
        Self {
            carts: CartService::new(store.clone()),
            checkout: OrderMaterializer::new(store.clone(), publisher),
            orders: OrderQueryService::new(store.clone()),
            store,
        }
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S, P>(state: Arc<AppState<S, P>>, metrics_handle: PrometheusHandle) -> Router
where
    S: Store + Clone + 'static,
    P: EventPublisher,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<S, P>))
        .route(
            "/cart",
            get(routes::cart::get::<S, P>).post(routes::cart::create::<S, P>),
        )
        .route("/cart/items", post(routes::cart::add_item::<S, P>))
        .route(
            "/cart/items/{id}",
            put(routes::cart::update_item::<S, P>).delete(routes::cart::remove_item::<S, P>),
        )
        .route(
            "/orders",
            post(routes::orders::create::<S, P>).get(routes::orders::list::<S, P>),
        )
        .route("/orders/{id}", get(routes::orders::get::<S, P>))
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
