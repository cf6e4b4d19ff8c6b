//! Webhook admin API: `/api/webhooks` CRUD plus test and stats endpoints.
//! Every handler requires `Authorization: Bearer <MCP_API_KEY>`.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use url::Url;
use uuid::Uuid;

use crate::http::{bearer_auth_ok, json_error, AppState};
use crate::store::{StoreError, WebhookRegistration};
use crate::webhook::manager::{MessageEventData, WebhookPayload};

const SUPPORTED_EVENT_TYPES: &[&str] = &["message"];

#[derive(Debug, Deserialize)]
pub struct CreateWebhookRequest {
    pub url: String,
    #[serde(default)]
    pub secret: String,
    #[serde(default)]
    pub event_types: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateWebhookRequest {
    pub url: Option<String>,
    pub secret: Option<String>,
    pub event_types: Option<Vec<String>>,
    pub active: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub id: String,
    pub url: String,
    pub event_types: Vec<String>,
    pub active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl WebhookResponse {
    fn from_registration(reg: &WebhookRegistration) -> Self {
        Self {
            id: reg.id.clone(),
            url: reg.url.clone(),
            event_types: reg.event_types.clone(),
            active: reg.active,
            created_at: rfc3339(reg.created_at),
            updated_at: rfc3339(reg.updated_at),
        }
    }
}

fn rfc3339(ts: i64) -> String {
    DateTime::from_timestamp(ts, 0)
        .unwrap_or_default()
        .to_rfc3339()
}

/// Scheme must be http or https and a host must be present.
fn validate_url(raw: &str) -> Result<(), String> {
    let parsed = Url::parse(raw).map_err(|e| e.to_string())?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err("invalid URL scheme: only http and https are allowed".into());
    }
    if parsed.host_str().map_or(true, |h| h.is_empty()) {
        return Err("invalid URL: host is required".into());
    }
    Ok(())
}

fn validate_event_types(event_types: &[String]) -> Result<(), String> {
    for event_type in event_types {
        if event_type.is_empty() {
            return Err("empty event type is not allowed".into());
        }
        if !SUPPORTED_EVENT_TYPES.contains(&event_type.as_str()) {
            return Err(format!("unsupported event type: {event_type}"));
        }
    }
    Ok(())
}

pub async fn create_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<CreateWebhookRequest>, axum::extract::rejection::JsonRejection>,
) -> Response {
    if !bearer_auth_ok(&headers, &state.api_key) {
        return json_error(StatusCode::UNAUTHORIZED, "Unauthorized");
    }
    let Json(req) = match body {
        Ok(body) => body,
        Err(_) => return json_error(StatusCode::BAD_REQUEST, "Invalid request body"),
    };

    if req.url.is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "URL is required");
    }
    if let Err(e) = validate_url(&req.url) {
        return json_error(StatusCode::BAD_REQUEST, &format!("Invalid URL: {e}"));
    }

    let event_types = if req.event_types.is_empty() {
        vec!["message".to_string()]
    } else {
        req.event_types
    };
    if let Err(e) = validate_event_types(&event_types) {
        return json_error(StatusCode::BAD_REQUEST, &e);
    }

    let now = Utc::now().timestamp();
    let webhook = WebhookRegistration {
        id: Uuid::new_v4().to_string(),
        url: req.url,
        secret: req.secret,
        event_types,
        active: true,
        created_at: now,
        updated_at: now,
    };

    if state.store.create_webhook(&webhook).is_err() {
        return json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to create webhook");
    }

    (
        StatusCode::CREATED,
        Json(WebhookResponse::from_registration(&webhook)),
    )
        .into_response()
}

pub async fn list_webhooks(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if !bearer_auth_ok(&headers, &state.api_key) {
        return json_error(StatusCode::UNAUTHORIZED, "Unauthorized");
    }
    match state.store.list_webhooks(false) {
        Ok(webhooks) => {
            let out: Vec<WebhookResponse> = webhooks
                .iter()
                .map(WebhookResponse::from_registration)
                .collect();
            Json(json!({ "webhooks": out })).into_response()
        }
        Err(_) => json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to list webhooks"),
    }
}

pub async fn get_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if !bearer_auth_ok(&headers, &state.api_key) {
        return json_error(StatusCode::UNAUTHORIZED, "Unauthorized");
    }
    match state.store.get_webhook(&id) {
        Ok(webhook) => Json(WebhookResponse::from_registration(&webhook)).into_response(),
        Err(StoreError::NotFound) => json_error(StatusCode::NOT_FOUND, "Webhook not found"),
        Err(_) => json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to get webhook"),
    }
}

pub async fn update_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Result<Json<UpdateWebhookRequest>, axum::extract::rejection::JsonRejection>,
) -> Response {
    if !bearer_auth_ok(&headers, &state.api_key) {
        return json_error(StatusCode::UNAUTHORIZED, "Unauthorized");
    }
    let mut webhook = match state.store.get_webhook(&id) {
        Ok(webhook) => webhook,
        Err(StoreError::NotFound) => return json_error(StatusCode::NOT_FOUND, "Webhook not found"),
        Err(_) => return json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to get webhook"),
    };
    let Json(req) = match body {
        Ok(body) => body,
        Err(_) => return json_error(StatusCode::BAD_REQUEST, "Invalid request body"),
    };

    if let Some(url) = &req.url {
        if let Err(e) = validate_url(url) {
            return json_error(StatusCode::BAD_REQUEST, &format!("Invalid URL: {e}"));
        }
        webhook.url = url.clone();
    }
    // An empty secret intentionally disables signing.
    if let Some(secret) = req.secret {
        webhook.secret = secret;
    }
    if let Some(event_types) = req.event_types {
        if let Err(e) = validate_event_types(&event_types) {
            return json_error(StatusCode::BAD_REQUEST, &e);
        }
        webhook.event_types = event_types;
    }
    if let Some(active) = req.active {
        webhook.active = active;
    }
    webhook.updated_at = Utc::now().timestamp();

    if state.store.update_webhook(&webhook).is_err() {
        return json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to update webhook");
    }
    Json(WebhookResponse::from_registration(&webhook)).into_response()
}

pub async fn delete_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if !bearer_auth_ok(&headers, &state.api_key) {
        return json_error(StatusCode::UNAUTHORIZED, "Unauthorized");
    }
    match state.store.delete_webhook(&id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(StoreError::NotFound) => json_error(StatusCode::NOT_FOUND, "Webhook not found"),
        Err(_) => json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to delete webhook"),
    }
}

/// Synchronous single-shot delivery of a canned payload.
pub async fn test_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if !bearer_auth_ok(&headers, &state.api_key) {
        return json_error(StatusCode::UNAUTHORIZED, "Unauthorized");
    }
    let webhook = match state.store.get_webhook(&id) {
        Ok(webhook) => webhook,
        Err(StoreError::NotFound) => return json_error(StatusCode::NOT_FOUND, "Webhook not found"),
        Err(_) => return json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to get webhook"),
    };

    let payload = WebhookPayload {
        id: Uuid::new_v4().to_string(),
        event_type: "message.received".to_string(),
        timestamp: Utc::now(),
        data: MessageEventData {
            message_id: format!("TEST-{}", Uuid::new_v4()),
            chat_jid: "test@s.whatsapp.net".to_string(),
            sender_jid: "test@s.whatsapp.net".to_string(),
            text: "This is a test message from the WhatsApp MCP webhook system".to_string(),
            timestamp: Utc::now(),
            is_from_me: false,
            message_type: "text".to_string(),
            chat_name: "Test Chat".to_string(),
            sender_push_name: String::new(),
            sender_contact_name: String::new(),
            is_group: false,
            media_metadata: None,
        },
    };

    match state.webhooks.test_delivery(&webhook, &payload).await {
        Ok(()) => Json(json!({ "status": "delivered", "payload_id": payload.id })).into_response(),
        Err(e) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({ "status": "failed", "error": e.to_string() })),
        )
            .into_response(),
    }
}

/// Delivery statistics over the last 24 hours.
pub async fn webhook_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if !bearer_auth_ok(&headers, &state.api_key) {
        return json_error(StatusCode::UNAUTHORIZED, "Unauthorized");
    }
    if let Err(StoreError::NotFound) = state.store.get_webhook(&id) {
        return json_error(StatusCode::NOT_FOUND, "Webhook not found");
    }

    let since = Utc::now().timestamp() - 24 * 3600;
    match state.store.get_delivery_stats(&id, since) {
        Ok(stats) => Json(stats).into_response(),
        Err(_) => json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to get stats"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_validation() {
        assert!(validate_url("https://example.com/hook").is_ok());
        assert!(validate_url("http://localhost:9000/hook").is_ok());
        assert!(validate_url("ftp://example.com").is_err());
        assert!(validate_url("file:///etc/passwd").is_err());
        assert!(validate_url("not a url").is_err());
    }

    #[test]
    fn event_type_validation() {
        assert!(validate_event_types(&["message".to_string()]).is_ok());
        assert!(validate_event_types(&[]).is_ok());
        assert!(validate_event_types(&[String::new()]).is_err());
        assert!(validate_event_types(&["presence".to_string()]).is_err());
    }
}
