//! API route definitions

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::any;
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use super::handlers;
use super::handlers::AppState;
use super::middleware as guards;

/// Create the chat router.
///
/// `/chat` layers, outermost first: CORS, request id, admission control,
/// bearer auth, body limit.
pub fn chat_router(state: AppState) -> Router {
    let chat = any(handlers::handle_chat)
        .layer(DefaultBodyLimit::max(state.max_body_bytes))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            guards::require_auth,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            guards::rate_limit,
        ))
        .layer(middleware::from_fn(guards::request_id))
        .layer(middleware::from_fn_with_state(state.clone(), guards::cors));

    Router::new()
        .route("/chat", chat)
        .route("/healthz", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
