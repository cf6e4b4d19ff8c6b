//! Protocol library seam.
//!
//! The WhatsApp Web client is an external collaborator: the bridge only
//! depends on the operations below. A production deployment mounts a real
//! backend in [`attach`]; the in-process port implements the same trait over
//! scripted state and backs the integration tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use log::warn;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::types::events::Event;
use crate::types::jid::Jid;
use crate::types::message::MediaDescriptor;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("not logged in")]
    NotLoggedIn,
    #[error("not connected to WhatsApp")]
    NotConnected,
    /// The media payload no longer exists upstream (404/410-like). Terminal;
    /// retrying cannot succeed.
    #[error("media gone (status {status})")]
    MediaGone { status: u16 },
    #[error("protocol timeout")]
    Timeout,
    #[error("{0}")]
    Protocol(String),
}

impl ProtocolError {
    pub fn is_gone(&self) -> bool {
        matches!(self, ProtocolError::MediaGone { .. })
    }
}

/// Contact-store entry. Name priority when deriving a chat's contact name is
/// `full_name > first_name > business_name`.
#[derive(Debug, Clone, Default)]
pub struct ContactEntry {
    pub full_name: String,
    pub first_name: String,
    pub business_name: String,
}

impl ContactEntry {
    pub fn best_name(&self) -> &str {
        if !self.full_name.is_empty() {
            &self.full_name
        } else if !self.first_name.is_empty() {
            &self.first_name
        } else {
            &self.business_name
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GroupParticipantInfo {
    pub jid: Jid,
    pub is_admin: bool,
}

#[derive(Debug, Clone, Default)]
pub struct GroupInfo {
    pub jid: Jid,
    pub name: String,
    pub participants: Vec<GroupParticipantInfo>,
}

#[derive(Debug, Clone)]
pub struct SendResponse {
    /// Protocol-assigned message id.
    pub id: String,
    pub sender: Jid,
    pub timestamp: i64,
}

/// On-demand history request, anchored at the oldest known message.
#[derive(Debug, Clone)]
pub struct HistoryRequest {
    pub chat: Jid,
    pub anchor_id: String,
    pub anchor_timestamp: i64,
    pub anchor_from_me: bool,
    pub count: u32,
}

/// Operations the bridge needs from the protocol library.
#[async_trait]
pub trait ProtocolPort: Send + Sync {
    fn is_logged_in(&self) -> bool;

    async fn own_jid(&self) -> Option<Jid>;

    async fn send_text(&self, to: &Jid, text: &str) -> Result<SendResponse, ProtocolError>;

    /// Alternate-namespace lookup (LID → phone or phone → LID). Consults
    /// process state inside the library; may fail silently.
    async fn alt_jid(&self, jid: &Jid) -> Option<Jid>;

    async fn group_info(&self, jid: &Jid) -> Result<GroupInfo, ProtocolError>;

    async fn contact(&self, jid: &Jid) -> Option<ContactEntry>;

    /// Fetches and decrypts one media payload. HMAC and SHA verification
    /// happen inside the library.
    async fn download_media(&self, descriptor: &MediaDescriptor) -> Result<Vec<u8>, ProtocolError>;

    /// Sends a peer-to-self request for messages older than the anchor. The
    /// response arrives later as an ON_DEMAND history-sync event.
    async fn request_history(&self, request: &HistoryRequest) -> Result<(), ProtocolError>;

    async fn disconnect(&self);
}

/// Mounts the protocol backend and returns the port plus its event stream.
///
/// This build links no WhatsApp Web client; it runs the in-process port,
/// which starts logged out (health reports 503 until a real backend is
/// mounted here).
pub async fn attach() -> anyhow::Result<(Arc<dyn ProtocolPort>, mpsc::Receiver<Event>)> {
    warn!("No WhatsApp Web backend linked into this build; running the in-process port");
    let (port, events) = InProcessPort::with_events();
    Ok((port, events))
}

/// In-process implementation of [`ProtocolPort`] over scripted state.
///
/// Doubles as the development backend and the test double: tests inject
/// events through the handle returned by [`InProcessPort::with_events`] and
/// script lookups/downloads with the `script_*` methods.
#[derive(Default)]
pub struct InProcessPort {
    logged_in: AtomicBool,
    own: Mutex<Option<Jid>>,
    alt_jids: Mutex<HashMap<String, Jid>>,
    contacts: Mutex<HashMap<String, ContactEntry>>,
    groups: Mutex<HashMap<String, GroupInfo>>,
    media_script: Mutex<VecDeque<Result<Vec<u8>, ProtocolError>>>,
    sent: Mutex<Vec<(Jid, String)>>,
    history_requests: Mutex<Vec<HistoryRequest>>,
    events_tx: Mutex<Option<mpsc::Sender<Event>>>,
}

impl InProcessPort {
    /// A port with no linked session; `is_logged_in` reports false.
    pub fn disconnected() -> Self {
        Self::default()
    }

    /// A logged-in port owning the given JID.
    pub fn logged_in(own: Jid) -> Self {
        let port = Self::default();
        port.logged_in.store(true, Ordering::SeqCst);
        *port.own.lock().unwrap() = Some(own);
        port
    }

    /// Builds a port together with the event stream the bridge consumes.
    /// Events injected via [`InProcessPort::inject_event`] appear on the
    /// stream.
    pub fn with_events() -> (Arc<Self>, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(64);
        let port = Self::default();
        *port.events_tx.lock().unwrap() = Some(tx);
        (Arc::new(port), rx)
    }

    pub fn set_logged_in(&self, own: Jid) {
        self.logged_in.store(true, Ordering::SeqCst);
        *self.own.lock().unwrap() = Some(own);
    }

    pub fn script_alt_jid(&self, from: Jid, to: Jid) {
        self.alt_jids.lock().unwrap().insert(from.to_string(), to);
    }

    pub fn script_contact(&self, jid: &Jid, entry: ContactEntry) {
        self.contacts
            .lock()
            .unwrap()
            .insert(jid.to_non_ad().to_string(), entry);
    }

    pub fn script_group(&self, info: GroupInfo) {
        self.groups
            .lock()
            .unwrap()
            .insert(info.jid.to_string(), info);
    }

    /// Queues one download outcome; each `download_media` call pops one.
    pub fn script_media(&self, outcome: Result<Vec<u8>, ProtocolError>) {
        self.media_script.lock().unwrap().push_back(outcome);
    }

    pub async fn inject_event(&self, event: Event) {
        let tx = self.events_tx.lock().unwrap().clone();
        if let Some(tx) = tx {
            let _ = tx.send(event).await;
        }
    }

    pub fn sent_messages(&self) -> Vec<(Jid, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn history_requests(&self) -> Vec<HistoryRequest> {
        self.history_requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProtocolPort for InProcessPort {
    fn is_logged_in(&self) -> bool {
        self.logged_in.load(Ordering::SeqCst)
    }

    async fn own_jid(&self) -> Option<Jid> {
        self.own.lock().unwrap().clone()
    }

    async fn send_text(&self, to: &Jid, text: &str) -> Result<SendResponse, ProtocolError> {
        if !self.is_logged_in() {
            return Err(ProtocolError::NotLoggedIn);
        }
        let sender = self
            .own
            .lock()
            .unwrap()
            .clone()
            .ok_or(ProtocolError::NotLoggedIn)?;
        self.sent
            .lock()
            .unwrap()
            .push((to.clone(), text.to_string()));
        Ok(SendResponse {
            id: Uuid::new_v4().simple().to_string().to_uppercase(),
            sender: sender.to_non_ad(),
            timestamp: Utc::now().timestamp(),
        })
    }

    async fn alt_jid(&self, jid: &Jid) -> Option<Jid> {
        self.alt_jids
            .lock()
            .unwrap()
            .get(&jid.to_non_ad().to_string())
            .cloned()
    }

    async fn group_info(&self, jid: &Jid) -> Result<GroupInfo, ProtocolError> {
        self.groups
            .lock()
            .unwrap()
            .get(&jid.to_string())
            .cloned()
            .ok_or_else(|| ProtocolError::Protocol(format!("unknown group {jid}")))
    }

    async fn contact(&self, jid: &Jid) -> Option<ContactEntry> {
        self.contacts
            .lock()
            .unwrap()
            .get(&jid.to_non_ad().to_string())
            .cloned()
    }

    async fn download_media(
        &self,
        _descriptor: &MediaDescriptor,
    ) -> Result<Vec<u8>, ProtocolError> {
        match self.media_script.lock().unwrap().pop_front() {
            Some(outcome) => outcome,
            None => Err(ProtocolError::NotConnected),
        }
    }

    async fn request_history(&self, request: &HistoryRequest) -> Result<(), ProtocolError> {
        if !self.is_logged_in() {
            return Err(ProtocolError::NotLoggedIn);
        }
        self.history_requests.lock().unwrap().push(request.clone());
        Ok(())
    }

    async fn disconnect(&self) {
        self.logged_in.store(false, Ordering::SeqCst);
    }
}
