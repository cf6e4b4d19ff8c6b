//! On-demand history-sync coordination.
//!
//! The protocol library answers a peer-to-self history request with a later
//! HistorySync event marked ON_DEMAND. This module bridges that asynchronous
//! round trip into a synchronous call: the requester registers a single-slot
//! channel keyed by canonical chat JID, the ingestion handler signals it
//! when the matching batch lands, and the requester then reads the newly
//! persisted messages back out of the store.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};

use crate::canonical::Canonicaliser;
use crate::protocol::{HistoryRequest, ProtocolError, ProtocolPort};
use crate::store::{MessageStore, MessageWithNames, StoreError};
use crate::types::jid::JidError;

const WAIT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("invalid chat JID: {0}")]
    InvalidJid(#[from] JidError),

    /// No stored message exists to anchor the request; the caller must wait
    /// for the initial spontaneous sync.
    #[error("no messages in database for this chat; wait for the initial history sync")]
    NoHistoryAnchor,

    #[error("timeout waiting for history sync; retry with wait_for_sync=false for async mode")]
    Timeout,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct HistoryCoordinator {
    store: Arc<MessageStore>,
    port: Arc<dyn ProtocolPort>,
    canonical: Canonicaliser,
    waiters: Mutex<HashMap<String, mpsc::Sender<()>>>,
    wait_timeout: Duration,
}

impl HistoryCoordinator {
    pub fn new(
        store: Arc<MessageStore>,
        port: Arc<dyn ProtocolPort>,
        canonical: Canonicaliser,
    ) -> Self {
        Self {
            store,
            port,
            canonical,
            waiters: Mutex::new(HashMap::new()),
            wait_timeout: WAIT_TIMEOUT,
        }
    }

    /// Overrides the 30 s wait deadline.
    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }

    /// Requests `count` messages older than the chat's oldest known one.
    ///
    /// With `wait=false` the request is sent and an empty list returned;
    /// the messages land in the store whenever the sync arrives. With
    /// `wait=true` the call blocks until the matching ON_DEMAND batch has
    /// been persisted (or 30 s pass) and returns the newly loaded messages,
    /// newest first.
    pub async fn request_history_sync(
        &self,
        chat_jid: &str,
        count: u32,
        wait: bool,
    ) -> Result<Vec<MessageWithNames>, HistoryError> {
        let canonical_jid = self.canonical.canonicalise_str(chat_jid).await?;

        let anchor = self
            .store
            .get_oldest_message(&canonical_jid)?
            .ok_or(HistoryError::NoHistoryAnchor)?;

        let request = HistoryRequest {
            chat: chat_jid.parse()?,
            anchor_id: anchor.id.clone(),
            anchor_timestamp: anchor.timestamp,
            anchor_from_me: anchor.is_from_me,
            count,
        };

        if !wait {
            self.port.request_history(&request).await?;
            info!("Sent ON_DEMAND history sync request for chat {canonical_jid} (count: {count}, async mode)");
            return Ok(Vec::new());
        }

        let anchor_timestamp = anchor.timestamp;
        let mut rx = self.register(&canonical_jid).await;

        if let Err(e) = self.port.request_history(&request).await {
            self.deregister(&canonical_jid).await;
            return Err(e.into());
        }
        info!("Sent ON_DEMAND history sync request for chat {canonical_jid} (count: {count})");

        match tokio::time::timeout(self.wait_timeout, rx.recv()).await {
            Ok(_) => {
                debug!("History sync completed for chat {canonical_jid}");
            }
            Err(_) => {
                self.deregister(&canonical_jid).await;
                return Err(HistoryError::Timeout);
            }
        }

        let messages = self.store.get_messages_older_than(
            &canonical_jid,
            anchor_timestamp,
            count as i64,
        )?;
        info!(
            "Retrieved {} newly loaded messages for chat {canonical_jid}",
            messages.len()
        );
        Ok(messages)
    }

    /// Wakes the waiter registered for a chat, if any. Called by the
    /// ingestion handler once an ON_DEMAND batch is fully persisted. The
    /// registration is removed so a later request can re-register.
    pub async fn signal(&self, canonical_jid: &str) {
        if let Some(tx) = self.waiters.lock().await.remove(canonical_jid) {
            // Non-blocking; a second signal racing the same slot is dropped.
            let _ = tx.try_send(());
        }
    }

    async fn register(&self, canonical_jid: &str) -> mpsc::Receiver<()> {
        let (tx, rx) = mpsc::channel(1);
        self.waiters
            .lock()
            .await
            .insert(canonical_jid.to_string(), tx);
        rx
    }

    async fn deregister(&self, canonical_jid: &str) {
        self.waiters.lock().await.remove(canonical_jid);
    }
}
