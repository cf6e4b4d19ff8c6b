use std::collections::HashMap;

use log::{debug, error, warn};

use crate::handlers::EventHandler;
use crate::store::models::{download_status, Chat, Message};
use crate::types::events::MessageInfo;
use crate::types::message::WaMessage;

impl EventHandler {
    /// Live-message pipeline: media descriptor, display text, canonical
    /// JIDs, name derivation, chat-then-message upserts, push-name cache,
    /// enriched read-back, webhook emit.
    pub(super) async fn handle_message(&self, msg: WaMessage, info: MessageInfo) {
        debug!(
            "Received message {} from {} in {}",
            info.id, info.sender, info.chat
        );

        if msg.is_key_distribution() {
            return;
        }

        let inner = msg.unwrapped();
        let message_type = inner.message_type();
        if message_type == "poll" {
            // Recognised but deliberately not persisted.
            debug!("Skipping poll message {}", info.id);
            return;
        }

        let descriptor = inner.media_descriptor();
        let text = inner.display_text();

        let chat_jid = self.canonical.canonicalise(&info.chat).await;
        let sender_jid = self.canonical.canonicalise(&info.sender).await;
        if chat_jid.is_empty() {
            warn!("Message {} has an empty chat JID, dropping", info.id);
            return;
        }

        let mut push_name = String::new();
        let mut contact_name = String::new();
        if info.is_group {
            // Cache-through: prefer the name already on the chat row, else
            // ask the protocol library.
            push_name = match self.store.get_chat_by_jid(&chat_jid) {
                Ok(Some(existing)) if !existing.push_name.is_empty() => existing.push_name,
                _ => match self.port.group_info(&info.chat).await {
                    Ok(group) => group.name,
                    Err(e) => {
                        debug!("Failed to get group info for {}: {e}", info.chat);
                        String::new()
                    }
                },
            };
        } else {
            if let Some(entry) = self.port.contact(&info.sender).await {
                contact_name = entry.best_name().to_string();
            }
            if !info.is_from_me {
                push_name = info.push_name.clone();
            }
        }

        // Chat first: the message row's foreign key needs it.
        let chat = Chat {
            jid: chat_jid.clone(),
            push_name,
            contact_name,
            last_message_time: info.timestamp,
            unread_count: 0,
            is_group: info.is_group,
        };
        if let Err(e) = self.store.save_chat(&chat) {
            error!("Failed to save chat {chat_jid}: {e}");
            return;
        }

        let row = Message {
            id: info.id.clone(),
            chat_jid: chat_jid.clone(),
            sender_jid: sender_jid.clone(),
            text,
            timestamp: info.timestamp,
            is_from_me: info.is_from_me,
            message_type: message_type.to_string(),
        };
        if let Err(e) = self.store.save_message(&row) {
            error!("Failed to save message {} in {chat_jid}: {e}", info.id);
            return;
        }
        debug!("Saved message {}", info.id);

        // Media metadata rides on the message row, so it lands after it.
        let mut media_row = None;
        if let Some(descriptor) = descriptor {
            let status = self.media.initial_status(&descriptor, false);
            let meta = self.media.metadata_row(&info.id, &descriptor, status);
            match self.store.save_media_metadata(&meta) {
                Ok(()) => {
                    if status == download_status::PENDING {
                        self.media.spawn_download(meta.clone(), descriptor);
                    }
                    media_row = Some(meta);
                }
                Err(e) => warn!("Failed to save media metadata for {}: {e}", info.id),
            }
        }

        if !info.is_from_me && !info.push_name.is_empty() {
            let mut names = HashMap::new();
            names.insert(sender_jid.clone(), info.push_name.clone());
            if let Err(e) = self.store.save_push_names(&names) {
                warn!("Failed to cache push name for {sender_jid}: {e}");
            }
        }

        match self.store.get_message_with_names(&info.id) {
            Ok(Some(enriched)) => {
                if let Err(e) = self
                    .webhooks
                    .emit_message_event(&enriched, media_row.as_ref())
                {
                    warn!("Failed to emit webhook event for {}: {e}", info.id);
                }
            }
            Ok(None) => {}
            Err(e) => warn!("Failed to read back message {}: {e}", info.id),
        }
    }
}
