use axum::{http::Method, middleware, routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use super::handlers;
use super::AppState;
use crate::middleware::request_id::{make_span_with_request_id, request_id_middleware};

/// Creates the main API router with all routes
pub fn create_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/api/recommend", get(handlers::recommend));

    // Local graphs have no blob endpoint in front of them
    if state.serves_local_graphs() {
        router = router.nest_service("/graphs", ServeDir::new(&state.config.graphs_dir));
    }

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET]);

    router
        .layer(cors)
        .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id))
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}
