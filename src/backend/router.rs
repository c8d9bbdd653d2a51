use std::sync::Arc;

use axum::{
    Router,
    middleware::{self},
    routing,
};
use tower_http::trace::TraceLayer;

use crate::{
    backend::{
        AppState,
        handlers::{health_handler, verify_entitlement_handler},
        metrics::metrics_handler,
        middleware::auth_middleware,
    },
    utils::constants::VERIFY_PATH,
};

pub fn build_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route(VERIFY_PATH, routing::get(verify_entitlement_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .merge(api)
        .route("/healthz", routing::get(health_handler))
        .route("/metrics", routing::get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
