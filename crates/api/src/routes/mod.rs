//! API routes

pub mod health;
pub mod support;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    auth::require_auth,
    realtime::{conversation_stream, staff_stream},
    state::AppState,
};

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    let auth_state = state.auth_state();

    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    // Protected API routes (auth required) - under /api/v1
    let protected_api_routes = Router::new()
        .route(
            "/conversations",
            get(support::list_conversations).post(support::create_conversation),
        )
        .route("/conversations/:conversation_id", get(support::get_conversation))
        .route("/conversations/:conversation_id/messages", post(support::send_message))
        .route("/conversations/:conversation_id/seen", post(support::mark_seen))
        .route("/conversations/:conversation_id/assign", post(support::assign_conversation))
        .route("/conversations/:conversation_id/status", post(support::update_status))
        .route("/conversations/:conversation_id/priority", post(support::update_priority))
        .route("/conversations/:conversation_id/tags", post(support::update_tags))
        .layer(middleware::from_fn_with_state(auth_state, require_auth));

    // Streaming routes (auth handled in handler via query parameter)
    let stream_routes = Router::new()
        .route("/stream", get(staff_stream))
        .route("/conversations/:conversation_id/stream", get(conversation_stream));

    // Combine API routes under /api/v1 prefix
    let api_v1_routes = Router::new()
        .merge(protected_api_routes)
        .merge(stream_routes);

    Router::new()
        .merge(health_routes)
        .nest("/api/v1", api_v1_routes)
        // Messages carry attachment references, not file bodies
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
