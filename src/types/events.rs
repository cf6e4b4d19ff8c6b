//! Events delivered by the protocol library.

use crate::types::jid::Jid;
use crate::types::message::{MessageKey, WaMessage};

/// Source metadata attached to a live message event.
#[derive(Debug, Clone, Default)]
pub struct MessageInfo {
    pub id: String,
    pub chat: Jid,
    pub sender: Jid,
    /// Alternate-namespace form of the sender, when the library knows it.
    pub sender_alt: Option<Jid>,
    pub push_name: String,
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    pub is_from_me: bool,
    pub is_group: bool,
}

/// One message inside a history-sync conversation.
#[derive(Debug, Clone, Default)]
pub struct HistoryMessage {
    pub key: MessageKey,
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    pub push_name: String,
    /// Sender as resolved by the library's structured parser; absent when
    /// parsing failed and the key must be used instead.
    pub sender: Option<Jid>,
    pub message: Option<WaMessage>,
}

#[derive(Debug, Clone, Default)]
pub struct HistoryConversation {
    /// Raw chat JID string as carried in the payload.
    pub id: String,
    pub messages: Vec<HistoryMessage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistorySyncType {
    InitialBootstrap,
    Recent,
    Full,
    /// Response to an explicit backfill request.
    OnDemand,
    NonBlockingData,
}

#[derive(Debug, Clone)]
pub struct HistorySyncPayload {
    pub sync_type: HistorySyncType,
    pub conversations: Vec<HistoryConversation>,
    /// `(jid, push_name)` pairs carried alongside the conversations.
    pub push_names: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct GroupParticipantUpdate {
    pub jid: Jid,
    pub is_admin: bool,
}

#[derive(Debug, Clone)]
pub struct GroupInfoUpdate {
    pub jid: Jid,
    pub name: Option<String>,
    pub timestamp: i64,
    /// Full participant snapshot, when the library supplies one.
    pub participants: Option<Vec<GroupParticipantUpdate>>,
}

#[derive(Debug, Clone)]
pub struct ContactUpdate {
    pub jid: Jid,
    pub full_name: Option<String>,
    pub first_name: Option<String>,
    pub business_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PushNameUpdate {
    pub jid: Jid,
    pub push_name: String,
}

/// Protocol events the ingestion handler consumes. Anything the library
/// emits beyond these is ignored.
#[derive(Debug, Clone)]
pub enum Event {
    Message(Box<WaMessage>, MessageInfo),
    HistorySync(Box<HistorySyncPayload>),
    GroupInfo(GroupInfoUpdate),
    Contact(ContactUpdate),
    PushName(PushNameUpdate),
    Connected,
    Disconnected,
    Qr { code: String },
    PairSuccess,
}
