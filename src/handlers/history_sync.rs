use std::collections::HashMap;

use log::{debug, error, info, warn};

use crate::handlers::EventHandler;
use crate::store::models::{download_status, Chat, MediaMetadata, Message};
use crate::types::events::{HistorySyncPayload, HistorySyncType};
use crate::types::jid::Jid;
use crate::types::message::MediaDescriptor;

impl EventHandler {
    /// History-sync batching. Chats are accumulated in memory (newest
    /// timestamp, first non-empty names) and persisted before the single
    /// bulk message insert so the foreign keys hold. ON_DEMAND batches
    /// signal the coordinator per conversation once everything is stored.
    pub(super) async fn handle_history_sync(&self, payload: HistorySyncPayload) {
        info!(
            "History sync: {} conversations ({:?})",
            payload.conversations.len(),
            payload.sync_type
        );

        // Preload the push-name cache and persist names the event carries
        // before any message references them.
        let mut cache = match self.store.load_all_push_names() {
            Ok(cache) => cache,
            Err(e) => {
                error!("Failed to load push name cache: {e}");
                return;
            }
        };
        let mut fresh: HashMap<String, String> = HashMap::new();
        for (jid, name) in &payload.push_names {
            if name.is_empty() || name == "-" {
                continue;
            }
            if cache.get(jid) != Some(name) {
                fresh.insert(jid.clone(), name.clone());
            }
        }
        if !fresh.is_empty() {
            if let Err(e) = self.store.save_push_names(&fresh) {
                warn!("Failed to save push names from history sync: {e}");
            }
            cache.extend(fresh);
        }

        let own_jid = self.port.own_jid().await;

        let mut chat_map: HashMap<String, Chat> = HashMap::new();
        let mut batch: Vec<Message> = Vec::new();
        let mut media_rows: Vec<(MediaMetadata, MediaDescriptor)> = Vec::new();
        let mut collected_names: HashMap<String, String> = HashMap::new();
        let mut synced_chats: Vec<String> = Vec::new();

        for conv in &payload.conversations {
            let chat_jid_obj: Jid = match conv.id.parse() {
                Ok(jid) => jid,
                Err(e) => {
                    error!("Failed to parse chat JID '{}': {e}", conv.id);
                    continue;
                }
            };
            let canonical_chat = self.canonical.canonicalise(&chat_jid_obj).await;
            if canonical_chat.is_empty() {
                continue;
            }
            let is_group = chat_jid_obj.is_group();

            let group_name = if is_group {
                match self.port.group_info(&chat_jid_obj).await {
                    Ok(group) => group.name,
                    Err(e) => {
                        debug!("Failed to get group info for {chat_jid_obj}: {e}");
                        String::new()
                    }
                }
            } else {
                String::new()
            };

            info!(
                "Processing chat: {canonical_chat} with {} messages",
                conv.messages.len()
            );
            synced_chats.push(canonical_chat.clone());

            for hist in &conv.messages {
                let Some(wa_msg) = hist.message.as_ref() else {
                    continue;
                };
                if hist.key.id.is_empty() || wa_msg.is_key_distribution() {
                    continue;
                }
                let inner = wa_msg.unwrapped();
                let message_type = inner.message_type();
                if message_type == "poll" {
                    debug!("Skipping poll message {}", hist.key.id);
                    continue;
                }

                let from_me = hist.key.from_me;

                // Prefer the library's structured parse; fall back to
                // reconstructing the sender from the message key.
                let sender_obj: Jid = match &hist.sender {
                    Some(sender) => sender.clone(),
                    None if from_me => own_jid.clone().unwrap_or_default(),
                    None => match &hist.key.participant {
                        Some(participant) => participant.parse().unwrap_or_default(),
                        None => hist.key.remote_jid.parse().unwrap_or_default(),
                    },
                };
                let sender_jid = self.canonical.canonicalise(&sender_obj).await;

                let sender_name = if !hist.push_name.is_empty() {
                    hist.push_name.clone()
                } else {
                    cache.get(&sender_jid).cloned().unwrap_or_default()
                };
                if !from_me
                    && !sender_name.is_empty()
                    && cache.get(&sender_jid) != Some(&sender_name)
                {
                    collected_names.insert(sender_jid.clone(), sender_name.clone());
                }

                let entry = chat_map
                    .entry(canonical_chat.clone())
                    .or_insert_with(|| Chat {
                        jid: canonical_chat.clone(),
                        push_name: String::new(),
                        contact_name: String::new(),
                        last_message_time: hist.timestamp,
                        unread_count: 0,
                        is_group,
                    });
                if hist.timestamp > entry.last_message_time {
                    entry.last_message_time = hist.timestamp;
                }
                if entry.push_name.is_empty() {
                    if is_group && !group_name.is_empty() {
                        entry.push_name = group_name.clone();
                    } else if !is_group && !from_me && !sender_name.is_empty() {
                        entry.push_name = sender_name.clone();
                    }
                }

                if let Some(descriptor) = inner.media_descriptor() {
                    let status = self.media.initial_status(&descriptor, true);
                    let meta = self.media.metadata_row(&hist.key.id, &descriptor, status);
                    media_rows.push((meta, descriptor));
                }

                batch.push(Message {
                    id: hist.key.id.clone(),
                    chat_jid: canonical_chat.clone(),
                    sender_jid,
                    text: inner.display_text(),
                    timestamp: hist.timestamp,
                    is_from_me: from_me,
                    message_type: message_type.to_string(),
                });
            }
        }

        // Chats strictly before messages.
        if !chat_map.is_empty() {
            info!("Updating {} chats from history sync", chat_map.len());
            for chat in chat_map.values() {
                if let Err(e) = self.store.save_chat(chat) {
                    warn!("Failed to save chat {}: {e}", chat.jid);
                }
            }
        }

        if !batch.is_empty() {
            info!("Saving {} messages from history sync", batch.len());
            if let Err(e) = self.store.save_bulk(&batch) {
                error!("Failed to save bulk messages: {e}");
                return;
            }
            info!("Successfully saved {} messages", batch.len());
        }

        // Media rows reference message ids, so they follow the bulk insert.
        for (meta, descriptor) in media_rows {
            match self.store.save_media_metadata(&meta) {
                Ok(()) => {
                    if meta.download_status == download_status::PENDING {
                        self.media.spawn_download(meta, descriptor);
                    }
                }
                Err(e) => warn!(
                    "Failed to save media metadata for {}: {e}",
                    meta.message_id
                ),
            }
        }

        if !collected_names.is_empty() {
            if let Err(e) = self.store.save_push_names(&collected_names) {
                warn!("Failed to save push names collected from messages: {e}");
            }
        }

        if payload.sync_type == HistorySyncType::OnDemand {
            for chat in synced_chats {
                self.history.signal(&chat).await;
            }
        }
    }
}
