use std::sync::{Arc, Mutex as StdMutex};

use anyhow::Context;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::WebhookConfig;
use crate::store::{MediaMetadata, MessageStore, MessageWithNames, WebhookRegistration};
use crate::types::jid::GROUP_SERVER;
use crate::webhook::delivery::{self, DeliveryError};

const SHUTDOWN_DRAIN: std::time::Duration = std::time::Duration::from_secs(30);

/// JSON body POSTed to webhook endpoints. `id` is the consumer-side
/// idempotency key: fresh per event per webhook.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookPayload {
    pub id: String,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub data: MessageEventData,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageEventData {
    pub message_id: String,
    pub chat_jid: String,
    pub sender_jid: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub is_from_me: bool,
    pub message_type: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub chat_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub sender_push_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub sender_contact_name: String,
    pub is_group: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_metadata: Option<MediaReference>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MediaReference {
    pub message_id: String,
    pub file_name: String,
    pub file_size: i64,
    pub mime_type: String,
    pub has_media: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct DeliveryTask {
    pub webhook: WebhookRegistration,
    pub payload: WebhookPayload,
    pub attempt: usize,
}

pub struct WebhookManager {
    store: Arc<MessageStore>,
    config: WebhookConfig,
    client: reqwest::Client,
    tx: mpsc::Sender<DeliveryTask>,
    cancel: CancellationToken,
    workers: StdMutex<Vec<JoinHandle<()>>>,
}

impl WebhookManager {
    /// Builds the manager and starts its worker pool.
    pub fn start(
        store: Arc<MessageStore>,
        config: WebhookConfig,
        cancel: CancellationToken,
    ) -> anyhow::Result<Arc<Self>> {
        let client = reqwest::Client::builder()
            .timeout(config.delivery_timeout)
            .build()
            .context("failed to build webhook HTTP client")?;

        let (tx, rx) = mpsc::channel(config.channel_capacity);
        let rx = Arc::new(Mutex::new(rx));

        let manager = Arc::new(Self {
            store,
            config,
            client,
            tx,
            cancel,
            workers: StdMutex::new(Vec::new()),
        });

        let mut handles = Vec::new();
        for id in 0..manager.config.worker_pool_size {
            let worker = Arc::clone(&manager);
            let rx = Arc::clone(&rx);
            handles.push(tokio::spawn(async move { worker.run_worker(id, rx).await }));
        }
        *manager.workers.lock().unwrap() = handles;
        info!(
            "Started {} webhook delivery workers",
            manager.config.worker_pool_size
        );

        Ok(manager)
    }

    /// Fans one enriched message out to every active webhook subscribed to
    /// `message` events. Never blocks: if the queue is full the task is
    /// dropped with a warning.
    pub fn emit_message_event(
        &self,
        msg: &MessageWithNames,
        media: Option<&MediaMetadata>,
    ) -> crate::store::Result<()> {
        let webhooks = self.store.list_webhooks(true)?;

        for webhook in webhooks {
            if !webhook.event_types.iter().any(|t| t == "message") {
                continue;
            }
            let task = DeliveryTask {
                payload: build_message_payload(msg, media),
                webhook,
                attempt: 1,
            };
            if let Err(mpsc::error::TrySendError::Full(task)) = self.tx.try_send(task) {
                warn!(
                    "Webhook delivery queue full, dropping event for webhook {}",
                    task.webhook.id
                );
            }
        }
        Ok(())
    }

    /// Synchronous single-shot delivery that bypasses the queue; used by the
    /// admin test endpoint.
    pub async fn test_delivery(
        &self,
        webhook: &WebhookRegistration,
        payload: &WebhookPayload,
    ) -> Result<(), DeliveryError> {
        delivery::deliver(&self.client, &self.store, webhook, payload, 1).await
    }

    async fn run_worker(
        self: Arc<Self>,
        id: usize,
        rx: Arc<Mutex<mpsc::Receiver<DeliveryTask>>>,
    ) {
        debug!("Webhook worker {id} started");
        loop {
            let task = tokio::select! {
                _ = self.cancel.cancelled() => return,
                task = async { rx.lock().await.recv().await } => match task {
                    Some(task) => task,
                    None => return,
                },
            };

            debug!("Worker {id} delivering to webhook {}", task.webhook.id);
            if delivery::deliver(
                &self.client,
                &self.store,
                &task.webhook,
                &task.payload,
                task.attempt,
            )
            .await
            .is_err()
            {
                self.schedule_retry(task);
            }
        }
    }

    /// Schedules a retry through a one-shot timer task. The attempt count
    /// is capped at `min(max_retries, backoff table length)`.
    fn schedule_retry(self: &Arc<Self>, mut task: DeliveryTask) {
        let cap = self.config.max_retries.min(self.config.retry_backoff.len());
        if task.attempt >= cap {
            return;
        }
        let delay = self.config.retry_backoff[task.attempt];
        task.attempt += 1;

        let manager = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = manager.cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    tokio::select! {
                        _ = manager.cancel.cancelled() => {}
                        result = manager.tx.send(task) => {
                            if result.is_err() {
                                debug!("Delivery channel closed, dropping retry");
                            }
                        }
                    }
                }
            }
        });
    }

    /// Cancels the workers and waits up to 30 s for in-flight deliveries.
    pub async fn shutdown(&self) {
        info!("Stopping webhook manager...");
        self.cancel.cancel();

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.workers.lock().unwrap());
        let drain = async {
            for handle in handles {
                let _ = handle.await;
            }
        };
        if tokio::time::timeout(SHUTDOWN_DRAIN, drain).await.is_err() {
            warn!("Webhook workers did not stop within timeout");
        } else {
            info!("All webhook workers stopped gracefully");
        }
    }
}

/// Builds the outbound payload for one enriched message.
pub fn build_message_payload(
    msg: &MessageWithNames,
    media: Option<&MediaMetadata>,
) -> WebhookPayload {
    let event_type = if msg.is_from_me {
        "message.sent"
    } else {
        "message.received"
    };

    let media_metadata = media.map(|m| MediaReference {
        message_id: m.message_id.clone(),
        file_name: m.file_name.clone(),
        file_size: m.file_size,
        mime_type: m.mime_type.clone(),
        has_media: !m.file_path.is_empty(),
    });

    WebhookPayload {
        id: Uuid::new_v4().to_string(),
        event_type: event_type.to_string(),
        timestamp: Utc::now(),
        data: MessageEventData {
            message_id: msg.id.clone(),
            chat_jid: msg.chat_jid.clone(),
            sender_jid: msg.sender_jid.clone(),
            text: msg.text.clone(),
            timestamp: DateTime::from_timestamp(msg.timestamp, 0).unwrap_or_default(),
            is_from_me: msg.is_from_me,
            message_type: msg.message_type.clone(),
            chat_name: msg.chat_name.clone(),
            sender_push_name: msg.sender_push_name.clone(),
            sender_contact_name: msg.sender_contact_name.clone(),
            is_group: msg.chat_jid.ends_with(&format!("@{GROUP_SERVER}")),
            media_metadata,
        },
    }
}
