//! HTTP surface: health check, the authenticated MCP transport, and the
//! webhook admin API.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get, post};
use axum::{Json, Router};
use serde_json::json;
use subtle::ConstantTimeEq;
use tower_http::cors::CorsLayer;

use crate::mcp::server::{McpServer, RpcRequest};
use crate::protocol::ProtocolPort;
use crate::store::MessageStore;
use crate::webhook::api;
use crate::webhook::WebhookManager;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<MessageStore>,
    pub port: Arc<dyn ProtocolPort>,
    pub mcp: Arc<McpServer>,
    pub webhooks: Arc<WebhookManager>,
    pub api_key: String,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/mcp/{*rest}", any(mcp_entry))
        .route(
            "/api/webhooks",
            post(api::create_webhook).get(api::list_webhooks),
        )
        .route(
            "/api/webhooks/{id}",
            get(api::get_webhook)
                .put(api::update_webhook)
                .delete(api::delete_webhook),
        )
        .route("/api/webhooks/{id}/test", post(api::test_webhook))
        .route("/api/webhooks/{id}/stats", get(api::webhook_stats))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Constant-time string comparison for API keys.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Validates `Authorization: Bearer <key>` with a constant-time comparison.
pub fn bearer_auth_ok(headers: &HeaderMap, api_key: &str) -> bool {
    let expected = format!("Bearer {api_key}");
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| constant_time_eq(v, &expected))
        .unwrap_or(false)
}

pub fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

async fn health(State(state): State<AppState>) -> Response {
    if state.port.is_logged_in() {
        (StatusCode::OK, "OK").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "WhatsApp not connected").into_response()
    }
}

/// `/mcp/<api-key>/<…>`: the first path segment is the API key; the
/// remainder is the transport path, which the single-endpoint Streamable
/// HTTP dispatcher does not further distinguish.
async fn mcp_entry(
    State(state): State<AppState>,
    Path(rest): Path<String>,
    method: Method,
    body: Bytes,
) -> Response {
    let (key, _remaining) = match rest.split_once('/') {
        Some((key, remaining)) => (key, remaining),
        None => (rest.as_str(), ""),
    };

    if !constant_time_eq(key, &state.api_key) {
        return (StatusCode::UNAUTHORIZED, "Unauthorized: Invalid API key").into_response();
    }

    if method != Method::POST {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    let request: RpcRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            return Json(json!({
                "jsonrpc": "2.0",
                "id": null,
                "error": { "code": -32700, "message": format!("parse error: {e}") },
            }))
            .into_response();
        }
    };

    match state.mcp.handle(request).await {
        Some(response) => Json(response).into_response(),
        // Notifications get no body.
        None => StatusCode::ACCEPTED.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_eq_matches_exactly() {
        assert!(constant_time_eq("secret", "secret"));
        assert!(!constant_time_eq("secret", "secret2"));
        assert!(!constant_time_eq("secret", "Secret"));
        assert!(!constant_time_eq("", "secret"));
    }

    #[test]
    fn bearer_auth_requires_exact_header() {
        let mut headers = HeaderMap::new();
        assert!(!bearer_auth_ok(&headers, "key"));

        headers.insert(header::AUTHORIZATION, "Bearer key".parse().unwrap());
        assert!(bearer_auth_ok(&headers, "key"));

        headers.insert(header::AUTHORIZATION, "Bearer wrong".parse().unwrap());
        assert!(!bearer_auth_ok(&headers, "key"));

        headers.insert(header::AUTHORIZATION, "key".parse().unwrap());
        assert!(!bearer_auth_ok(&headers, "key"));
    }
}
