//! Startup wiring and ordered shutdown.

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use log::{info, warn};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::canonical::Canonicaliser;
use crate::config::Config;
use crate::handlers::EventHandler;
use crate::history::HistoryCoordinator;
use crate::http::{self, AppState};
use crate::mcp::McpServer;
use crate::media::MediaManager;
use crate::paths;
use crate::protocol::ProtocolPort;
use crate::store::{MessageStore, WebhookRegistration};
use crate::types::events::Event;
use crate::webhook::WebhookManager;

/// Identifier of the webhook auto-registered from `WEBHOOK_URL`.
pub const PRIMARY_WEBHOOK_ID: &str = "system:primary";

/// Runs the bridge until the cancellation token fires, then shuts the
/// subsystems down in order: HTTP, protocol client, webhook drain, store.
pub async fn run(
    config: Config,
    port: Arc<dyn ProtocolPort>,
    events: mpsc::Receiver<Event>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    paths::ensure_data_directories().context("failed to create data directories")?;

    let store =
        Arc::new(MessageStore::open(paths::MESSAGES_DB_PATH).context("failed to init database")?);
    info!("Message storage initialized");

    let webhooks = WebhookManager::start(
        Arc::clone(&store),
        config.webhook.clone(),
        cancel.child_token(),
    )?;
    if let Some(url) = &config.webhook.primary_url {
        let now = Utc::now().timestamp();
        let primary = WebhookRegistration {
            id: PRIMARY_WEBHOOK_ID.to_string(),
            url: url.clone(),
            secret: String::new(),
            event_types: vec!["message".to_string()],
            active: true,
            created_at: now,
            updated_at: now,
        };
        match store.upsert_webhook(&primary) {
            Ok(()) => info!("Primary webhook registered from WEBHOOK_URL"),
            Err(e) => warn!("Failed to register primary webhook: {e}"),
        }
    }

    let canonical = Canonicaliser::new(Arc::clone(&port));
    let media = MediaManager::new(
        config.media.clone(),
        Arc::clone(&store),
        Arc::clone(&port),
        cancel.child_token(),
    );
    let history = Arc::new(HistoryCoordinator::new(
        Arc::clone(&store),
        Arc::clone(&port),
        canonical.clone(),
    ));

    let handler = EventHandler::new(
        Arc::clone(&store),
        Arc::clone(&port),
        canonical.clone(),
        media,
        Arc::clone(&webhooks),
        Arc::clone(&history),
    );
    let consumer = tokio::spawn(handler.run(events, cancel.child_token()));

    let mcp = Arc::new(McpServer::new(
        Arc::clone(&store),
        Arc::clone(&port),
        history,
        canonical,
        config.timezone,
    ));
    let state = AppState {
        store: Arc::clone(&store),
        port: Arc::clone(&port),
        mcp,
        webhooks: Arc::clone(&webhooks),
        api_key: config.api_key.clone(),
    };

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Starting server on http://{addr}");
    info!("- Health check: http://{addr}/health");
    info!("- MCP endpoint: http://{addr}/mcp/{{API_KEY}}");

    let http_cancel = cancel.clone();
    axum::serve(listener, http::build_router(state))
        .with_graceful_shutdown(async move { http_cancel.cancelled().await })
        .await
        .context("HTTP server error")?;

    info!("Shutting down...");
    port.disconnect().await;
    webhooks.shutdown().await;
    let _ = consumer.await;
    info!("Shutdown complete");
    Ok(())
}
