//! Middleware guarding `/chat`: CORS, request ids, admission control and bearer auth

use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::extract::Request;
use axum::extract::State;
use axum::http::header;
use axum::http::HeaderValue;
use axum::http::Method;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::response::Response;
use tracing::debug;
use tracing::info_span;
use tracing::warn;
use tracing::Instrument;

use crate::api::handlers::AppState;
use crate::guard::auth::extract_bearer_token;
use crate::guard::rate_limit::client_key;

/// Answers preflights and decorates responses for the allowed origin.
pub async fn cors(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let origin_allowed = request
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|origin| !origin.is_empty() && origin == &*state.cors_allowed_origin);

    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(request).await
    };

    if origin_allowed {
        if let Ok(origin) = HeaderValue::from_str(&state.cors_allowed_origin) {
            let headers = response.headers_mut();
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
            headers.insert(header::VARY, HeaderValue::from_static("Origin"));
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_METHODS,
                HeaderValue::from_static("POST, OPTIONS"),
            );
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_HEADERS,
                HeaderValue::from_static("Content-Type, Authorization"),
            );
        }
    }
    response
}

/// Id attached to every `/chat` request and its log span
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

pub async fn request_id(mut request: Request, next: Next) -> Response {
    let id = uuid::Uuid::new_v4().to_string();
    let span = info_span!("chat", req_id = %id);
    request.extensions_mut().insert(RequestId(id));
    next.run(request).instrument(span).await
}

/// Per-client fixed-window admission. Requests without a client key are refused.
pub async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let Some(key) = client_key(request.headers(), peer) else {
        warn!("Rate limit blocked: no client address");
        return (StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded").into_response();
    };

    let admission = state.admission.check(&key).await;
    let reset_in = admission
        .reset_at
        .saturating_duration_since(std::time::Instant::now())
        .as_secs();
    if !admission.allowed {
        warn!("Rate limit blocked {} (reset in {}s)", key, reset_in);
        return (StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded").into_response();
    }
    debug!(
        "Rate limit allowed {} ({} remaining, reset in {}s)",
        key, admission.remaining, reset_in
    );
    next.run(request).await
}

/// Requires a valid `Authorization: Bearer` token.
pub async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if !state.credentials.is_configured() {
        warn!("Chat request refused: auth secret not configured");
        return (StatusCode::INTERNAL_SERVER_ERROR, "auth not configured").into_response();
    }
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(extract_bearer_token);
    let Some(token) = token else {
        return (StatusCode::UNAUTHORIZED, "missing auth token").into_response();
    };
    if let Err(e) = state.credentials.verify(token) {
        debug!("Rejected auth token: {}", e);
        return (StatusCode::UNAUTHORIZED, "invalid auth token").into_response();
    }
    next.run(request).await
}
