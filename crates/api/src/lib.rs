//! HTTP API server for purchase and sale processing.
//!
//! Provides REST endpoints for purchases, sales and products, with
//! structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use processor::{OrderProcessor, ProcessorConfig};
use store::OrderStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::orders::{AppState, KindRoute, Purchases, Sales};

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: OrderStore + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .merge(order_routes::<S, Purchases>("/purchases"))
        .merge(order_routes::<S, Sales>("/sales"))
        .route(
            "/products",
            post(routes::products::create::<S>).get(routes::products::list::<S>),
        )
        .route(
            "/products/{id}",
            get(routes::products::get::<S>).put(routes::products::update::<S>),
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

fn order_routes<S: OrderStore + 'static, K: KindRoute>(
    base: &str,
) -> Router<Arc<AppState<S>>> {
    use routes::orders::{create, delete, get as get_one, list, update};

    Router::new()
        .route(base, post(create::<S, K>).get(list::<S, K>))
        .route(
            &format!("{base}/{{id}}"),
            get(get_one::<S, K>)
                .put(update::<S, K>)
                .delete(delete::<S, K>),
        )
}

/// Creates the application state around an order store.
pub fn create_default_state<S: OrderStore + 'static>(
    store: S,
    config: ProcessorConfig,
) -> Arc<AppState<S>> {
    Arc::new(AppState {
        processor: OrderProcessor::with_config(store, config),
    })
}
