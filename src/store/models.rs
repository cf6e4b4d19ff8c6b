use diesel::prelude::*;
use serde::Serialize;

use crate::store::schema::{
    chats, group_participants, media_metadata, messages, push_names, webhook_deliveries,
};

/// One conversation (DM or group). The anchor row every message references.
#[derive(Debug, Clone, Default, Queryable, QueryableByName, Selectable, Insertable)]
#[diesel(table_name = chats)]
pub struct Chat {
    pub jid: String,
    pub push_name: String,
    pub contact_name: String,
    /// Seconds since the Unix epoch.
    pub last_message_time: i64,
    pub unread_count: i32,
    pub is_group: bool,
}

impl Chat {
    /// Best available display name: contact name, else push name, else JID.
    pub fn display_name(&self) -> &str {
        if !self.contact_name.is_empty() {
            &self.contact_name
        } else if !self.push_name.is_empty() {
            &self.push_name
        } else {
            &self.jid
        }
    }
}

#[derive(Debug, Clone, Default, Queryable, QueryableByName, Selectable, Insertable)]
#[diesel(table_name = messages)]
pub struct Message {
    pub id: String,
    pub chat_jid: String,
    pub sender_jid: String,
    pub text: String,
    pub timestamp: i64,
    pub is_from_me: bool,
    pub message_type: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = push_names)]
pub struct PushNameRow {
    pub jid: String,
    pub push_name: String,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = group_participants)]
pub struct GroupParticipantRow {
    pub group_jid: String,
    pub participant_jid: String,
    pub is_admin: bool,
    pub joined_at: i64,
}

#[derive(Debug, Clone, Default, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = media_metadata)]
pub struct MediaMetadata {
    pub message_id: String,
    pub file_name: String,
    pub file_size: i64,
    pub mime_type: String,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub duration: Option<i32>,
    pub media_key: Vec<u8>,
    pub direct_path: String,
    pub file_sha256: Vec<u8>,
    pub file_enc_sha256: Vec<u8>,
    /// Relative path under the media root; empty until downloaded.
    pub file_path: String,
    pub download_status: String,
    pub download_timestamp: Option<i64>,
    pub download_error: Option<String>,
}

pub mod download_status {
    pub const PENDING: &str = "pending";
    pub const DOWNLOADED: &str = "downloaded";
    pub const FAILED: &str = "failed";
    pub const EXPIRED: &str = "expired";
    pub const SKIPPED: &str = "skipped";
}

/// Registered webhook endpoint.
#[derive(Debug, Clone)]
pub struct WebhookRegistration {
    pub id: String,
    pub url: String,
    pub secret: String,
    pub event_types: Vec<String>,
    pub active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// One webhook delivery attempt; rows are append-only.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = webhook_deliveries)]
pub struct DeliveryAttempt {
    pub webhook_id: String,
    pub payload_id: String,
    pub event_type: String,
    pub attempt_number: i32,
    pub status_code: Option<i32>,
    pub success: bool,
    pub error: Option<String>,
    pub attempted_at: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DeliveryStats {
    pub total: i64,
    pub successful: i64,
    pub failed: i64,
    pub success_rate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_delivery_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure_at: Option<i64>,
}

/// Message joined with display names: the sender's cached push name, the
/// sender's saved contact name, and the chat's coalesced display name.
#[derive(Debug, Clone, QueryableByName)]
pub struct MessageWithNames {
    #[diesel(sql_type = diesel::sql_types::Text)]
    pub id: String,
    #[diesel(sql_type = diesel::sql_types::Text)]
    pub chat_jid: String,
    #[diesel(sql_type = diesel::sql_types::Text)]
    pub sender_jid: String,
    #[diesel(sql_type = diesel::sql_types::Text)]
    pub text: String,
    #[diesel(sql_type = diesel::sql_types::BigInt)]
    pub timestamp: i64,
    #[diesel(sql_type = diesel::sql_types::Bool)]
    pub is_from_me: bool,
    #[diesel(sql_type = diesel::sql_types::Text)]
    pub message_type: String,
    #[diesel(sql_type = diesel::sql_types::Text)]
    pub sender_push_name: String,
    #[diesel(sql_type = diesel::sql_types::Text)]
    pub sender_contact_name: String,
    #[diesel(sql_type = diesel::sql_types::Text)]
    pub chat_name: String,
}

impl MessageWithNames {
    /// Best available sender name: contact name, else push name, else JID.
    pub fn sender_display_name(&self) -> &str {
        if !self.sender_contact_name.is_empty() {
            &self.sender_contact_name
        } else if !self.sender_push_name.is_empty() {
            &self.sender_push_name
        } else {
            &self.sender_jid
        }
    }
}
