use chrono::Utc;
use hmac::{Hmac, Mac};
use log::{debug, warn};
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use sha2::Sha256;
use thiserror::Error;

use crate::store::{DeliveryAttempt, MessageStore, WebhookRegistration};
use crate::webhook::manager::WebhookPayload;

const USER_AGENT_VALUE: &str = "WhatsApp-MCP-Webhook/1.0";
/// Response bodies are only read for error reporting, capped at 1 MiB.
const MAX_ERROR_BODY: usize = 1024 * 1024;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("failed to serialize payload: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("request failed: {0}")]
    Transport(String),

    #[error("unexpected status code {status}: {body}")]
    Status { status: u16, body: String },
}

/// Lowercase hex HMAC-SHA256 of the raw body, keyed by the webhook secret.
pub fn sign_payload(body: &[u8], secret: &str) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// POSTs one payload and records the attempt in the audit log. Success is
/// any 2xx status; everything else (including transport errors) records a
/// failure and returns the error so the caller can schedule a retry.
pub(crate) async fn deliver(
    client: &reqwest::Client,
    store: &MessageStore,
    webhook: &WebhookRegistration,
    payload: &WebhookPayload,
    attempt: usize,
) -> Result<(), DeliveryError> {
    debug!(
        "Delivering webhook: webhook_id={} payload_id={} attempt={attempt} url={}",
        webhook.id, payload.id, webhook.url
    );

    let body = match serde_json::to_vec(payload) {
        Ok(body) => body,
        Err(e) => {
            let err = DeliveryError::Serialize(e);
            record(store, webhook, payload, attempt, None, false, Some(&err));
            return Err(err);
        }
    };

    let mut request = client
        .post(&webhook.url)
        .header(CONTENT_TYPE, "application/json")
        .header(USER_AGENT, USER_AGENT_VALUE)
        .header("X-Webhook-ID", &webhook.id)
        .header("X-Event-ID", &payload.id);

    if !webhook.secret.is_empty() {
        request = request.header("X-Webhook-Signature", sign_payload(&body, &webhook.secret));
    }

    let response = match request.body(body).send().await {
        Ok(response) => response,
        Err(e) => {
            let err = DeliveryError::Transport(e.to_string());
            record(store, webhook, payload, attempt, None, false, Some(&err));
            return Err(err);
        }
    };

    let status = response.status();
    if status.is_success() {
        debug!(
            "Webhook delivered: webhook_id={} payload_id={} status={status}",
            webhook.id, payload.id
        );
        record(
            store,
            webhook,
            payload,
            attempt,
            Some(status.as_u16()),
            true,
            None,
        );
        return Ok(());
    }

    let body = response.bytes().await.unwrap_or_default();
    let snippet = String::from_utf8_lossy(&body[..body.len().min(MAX_ERROR_BODY)]).into_owned();
    let err = DeliveryError::Status {
        status: status.as_u16(),
        body: snippet,
    };
    record(
        store,
        webhook,
        payload,
        attempt,
        Some(status.as_u16()),
        false,
        Some(&err),
    );
    Err(err)
}

fn record(
    store: &MessageStore,
    webhook: &WebhookRegistration,
    payload: &WebhookPayload,
    attempt: usize,
    status_code: Option<u16>,
    success: bool,
    error: Option<&DeliveryError>,
) {
    if !success {
        debug!(
            "Webhook delivery failed: webhook_id={} payload_id={} attempt={attempt} error={:?}",
            webhook.id, payload.id, error
        );
    }
    let row = DeliveryAttempt {
        webhook_id: webhook.id.clone(),
        payload_id: payload.id.clone(),
        event_type: payload.event_type.clone(),
        attempt_number: attempt as i32,
        status_code: status_code.map(i32::from),
        success,
        error: error.map(|e| e.to_string()),
        attempted_at: Utc::now().timestamp(),
    };
    if let Err(e) = store.record_delivery(&row) {
        warn!("Failed to record delivery attempt: {e}");
    }
}
