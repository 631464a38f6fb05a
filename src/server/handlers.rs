// HTTP handlers and router

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware,
    response::{
        sse::{KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;

use super::middleware::auth_middleware;
use super::stream::relay_events;
use super::types::*;
use super::RelayServer;
use crate::config::constants::{SERVICE_NAME, TOKEN_OVERRIDE_HEADER};
use crate::errors::{RelayError, RelayResult};

const AVAILABLE_ENDPOINTS: [&str; 5] = [
    "GET /health",
    "POST /chat",
    "POST /chat/stream",
    "POST /chat/full",
    "POST /session/new",
];

/// Build the relay router. Everything but `/health` sits behind the API key check.
pub fn create_router(server: Arc<RelayServer>) -> Router {
    let protected = Router::new()
        .route("/chat", post(handle_chat))
        .route("/chat/stream", post(handle_chat_stream))
        .route("/chat/full", post(handle_chat_full))
        .route("/session/new", post(handle_new_session))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&server),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .merge(protected)
        .fallback(not_found)
        .with_state(server)
}

/// Liveness probe
pub async fn health_check(State(server): State<Arc<RelayServer>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: SERVICE_NAME.to_string(),
        active_sessions: server.relay().sessions().active_count(),
    })
}

/// Send a message and return the complete response
pub async fn handle_chat(
    State(server): State<Arc<RelayServer>>,
    headers: HeaderMap,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> RelayResult<Json<ChatResponse>> {
    let request = parse_chat_request(payload)?;
    let exchange = server
        .relay()
        .exchange(
            request.session_id.as_deref(),
            &request.message,
            token_override(&headers),
        )
        .await?;

    Ok(Json(ChatResponse {
        response: exchange.result.response,
        session_id: exchange.session_id,
        conversation_id: exchange.result.conversation_id,
    }))
}

/// Send a message and return the response with conversation, model and usage metadata
pub async fn handle_chat_full(
    State(server): State<Arc<RelayServer>>,
    headers: HeaderMap,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> RelayResult<Json<FullChatResponse>> {
    let request = parse_chat_request(payload)?;
    let relay = server.relay();
    let exchange = relay
        .exchange(
            request.session_id.as_deref(),
            &request.message,
            token_override(&headers),
        )
        .await?;

    let upstream = relay.upstream();
    let usage = &exchange.usage;

    Ok(Json(FullChatResponse {
        response: exchange.result.response,
        session_id: exchange.session_id,
        conversation_id: exchange.result.conversation_id,
        segment_id: exchange.result.segment_id,
        status_updates: exchange.result.status_updates,
        model: ModelInfo {
            config_state_id: upstream.config_state_id.clone(),
            gpt_system_id: upstream.gpt_system_id.clone(),
        },
        usage: UsageInfo {
            input_chars: usage.input_chars,
            output_chars: usage.output_chars,
            total_chars: usage.total_chars,
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            total_tokens: usage.total_tokens,
        },
    }))
}

/// Send a message and relay the response as server-sent events
pub async fn handle_chat_stream(
    State(server): State<Arc<RelayServer>>,
    headers: HeaderMap,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> RelayResult<Response> {
    let request = parse_chat_request(payload)?;
    let relay = server.relay_handle();
    let open = relay
        .open_stream(
            request.session_id.as_deref(),
            &request.message,
            token_override(&headers),
        )
        .await?;

    let events = relay_events(relay, open, request.message);
    let mut response = Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response();
    response.headers_mut().insert(
        HeaderName::from_static("x-accel-buffering"),
        HeaderValue::from_static("no"),
    );
    Ok(response)
}

/// Start a new conversation under a fresh session id
pub async fn handle_new_session(
    State(server): State<Arc<RelayServer>>,
    payload: Option<Json<NewSessionRequest>>,
) -> RelayResult<Json<NewSessionResponse>> {
    let previous = payload.and_then(|Json(request)| request.session_id);
    let session_id = server.relay().new_session(previous.as_deref())?;

    Ok(Json(NewSessionResponse {
        session_id,
        message: "New conversation started".to_string(),
    }))
}

pub async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "Endpoint not found",
            "available_endpoints": AVAILABLE_ENDPOINTS,
        })),
    )
}

fn parse_chat_request(payload: Result<Json<ChatRequest>, JsonRejection>) -> RelayResult<ChatRequest> {
    match payload {
        Ok(Json(request)) => Ok(request),
        Err(rejection) => {
            tracing::debug!(reason = %rejection.body_text(), "Unparseable chat request");
            Err(RelayError::missing_message())
        }
    }
}

fn token_override(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(TOKEN_OVERRIDE_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|token| !token.is_empty())
}
