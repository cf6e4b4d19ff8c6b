use chrono::Utc;
use log::{error, info, warn};

use crate::handlers::EventHandler;
use crate::store::models::{Chat, GroupParticipantRow};
use crate::types::events::GroupInfoUpdate;

impl EventHandler {
    /// Group metadata changes: name updates land on the chat row,
    /// participant snapshots replace the stored membership.
    pub(super) async fn handle_group_info(&self, update: GroupInfoUpdate) {
        let group_jid = self.canonical.canonicalise(&update.jid).await;
        if group_jid.is_empty() {
            return;
        }

        if let Some(name) = update.name.as_deref().filter(|n| !n.is_empty()) {
            let chat = Chat {
                jid: group_jid.clone(),
                push_name: name.to_string(),
                contact_name: String::new(),
                last_message_time: update.timestamp,
                unread_count: 0,
                is_group: true,
            };
            if let Err(e) = self.store.save_chat(&chat) {
                error!("Failed to update group name for {group_jid}: {e}");
                return;
            }
            info!("Updated group name: {group_jid} -> {name}");
        }

        if let Some(participants) = update.participants {
            // The membership rows reference the chat; make sure it exists
            // even when the update carried no name.
            match self.store.get_chat_by_jid(&group_jid) {
                Ok(None) => {
                    let placeholder = Chat {
                        jid: group_jid.clone(),
                        is_group: true,
                        last_message_time: update.timestamp,
                        ..Default::default()
                    };
                    if let Err(e) = self.store.save_chat(&placeholder) {
                        warn!("Failed to create chat row for group {group_jid}: {e}");
                        return;
                    }
                }
                Ok(Some(_)) => {}
                Err(e) => {
                    warn!("Failed to look up group {group_jid}: {e}");
                    return;
                }
            }

            let joined_at = Utc::now().timestamp();
            let mut rows = Vec::with_capacity(participants.len());
            for participant in &participants {
                let participant_jid = self.canonical.canonicalise(&participant.jid).await;
                if participant_jid.is_empty() {
                    continue;
                }
                rows.push(GroupParticipantRow {
                    group_jid: group_jid.clone(),
                    participant_jid,
                    is_admin: participant.is_admin,
                    joined_at,
                });
            }
            if let Err(e) = self.store.save_group_participants(&group_jid, &rows) {
                warn!("Failed to save participants for {group_jid}: {e}");
            }
        }
    }
}
