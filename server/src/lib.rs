//! HTTP serving layer for the dialogue generation service.

pub mod config;
pub mod error;
pub mod generation;
pub mod routes;
pub mod state;
pub mod validation;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::state::AppState;

/// Assemble the application router. Cross-cutting middleware (tracing,
/// rate limiting, timeouts, CORS) is layered on by the binary so tests can
/// drive the bare routes.
pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/voices", get(routes::list_voices))
        .route("/generate", post(routes::generate))
        .route("/generate/wav", post(routes::generate_wav))
        .route("/generate/stream", post(routes::generate_stream))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            routes::require_api_key,
        ));

    let public = Router::new()
        .route("/", get(routes::root_status))
        .route("/health", get(routes::health_check))
        .route("/metrics", get(routes::metrics_endpoint));

    Router::new()
        .merge(public)
        .merge(protected)
        .with_state(state)
}
