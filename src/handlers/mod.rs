//! Ingestion: the sole consumer of the protocol event stream.
//!
//! Every failure here is local to one event. A bad message is logged and
//! dropped so the stream keeps flowing; nothing in this module propagates
//! errors to the protocol library.

mod group;
mod history_sync;
mod message;

use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::canonical::Canonicaliser;
use crate::history::HistoryCoordinator;
use crate::media::MediaManager;
use crate::protocol::ProtocolPort;
use crate::store::MessageStore;
use crate::types::events::Event;
use crate::webhook::WebhookManager;

pub struct EventHandler {
    pub(crate) store: Arc<MessageStore>,
    pub(crate) port: Arc<dyn ProtocolPort>,
    pub(crate) canonical: Canonicaliser,
    pub(crate) media: Arc<MediaManager>,
    pub(crate) webhooks: Arc<WebhookManager>,
    pub(crate) history: Arc<HistoryCoordinator>,
}

impl EventHandler {
    pub fn new(
        store: Arc<MessageStore>,
        port: Arc<dyn ProtocolPort>,
        canonical: Canonicaliser,
        media: Arc<MediaManager>,
        webhooks: Arc<WebhookManager>,
        history: Arc<HistoryCoordinator>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            port,
            canonical,
            media,
            webhooks,
            history,
        })
    }

    /// Consumes the event stream until it closes or the token fires.
    pub async fn run(
        self: Arc<Self>,
        mut events: mpsc::Receiver<Event>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => return,
                },
            }
        }
    }

    pub async fn handle_event(&self, event: Event) {
        match event {
            Event::Message(msg, info) => self.handle_message(*msg, info).await,
            Event::HistorySync(payload) => self.handle_history_sync(*payload).await,
            Event::GroupInfo(update) => self.handle_group_info(update).await,
            // The protocol library's contact store is the source of truth;
            // it is consulted on the next message for that JID.
            Event::Contact(update) => debug!("Contact update for {}", update.jid),
            Event::PushName(update) => debug!("Push name update for {}", update.jid),
            Event::Connected => info!("Connected to WhatsApp"),
            Event::Disconnected => warn!("Disconnected from WhatsApp"),
            Event::Qr { code } => info!("Pairing QR code received:\n{code}"),
            Event::PairSuccess => info!("Successfully paired device"),
        }
    }
}
