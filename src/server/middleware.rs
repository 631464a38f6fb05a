// Middleware for API key authentication

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;

use super::RelayServer;
use crate::config::constants::API_KEY_HEADER;

/// Require `X-API-Key` to match the configured key.
///
/// A relay without a configured key lets every request through.
pub async fn auth_middleware(
    State(server): State<Arc<RelayServer>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(expected) = server.config().api_key.as_deref() else {
        return next.run(request).await;
    };

    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());

    if provided == Some(expected) {
        next.run(request).await
    } else {
        tracing::warn!(path = %request.uri().path(), "Rejected request with invalid or missing API key");
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Invalid or missing API key" })),
        )
            .into_response()
    }
}
