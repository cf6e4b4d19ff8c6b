//! LID ↔ phone-number map.
//!
//! WhatsApp addresses the same user under an opaque LID and a phone-number
//! JID. The canonicaliser collapses the two namespaces to one key; this map
//! caches the pairings it has learned so that repeated lookups (history sync
//! processes the same senders thousands of times) stay in-process.
//!
//! When multiple LIDs exist for the same phone number (rare), the most
//! recent one by `learned_at` timestamp is considered current.

use std::collections::HashMap;

use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LidPnEntry {
    /// LID user part, without the `@lid` suffix.
    pub lid: String,
    /// Phone-number user part, without the `@s.whatsapp.net` suffix.
    pub phone_number: String,
    pub learned_at: i64,
}

impl LidPnEntry {
    pub fn new(lid: String, phone_number: String, learned_at: i64) -> Self {
        Self {
            lid,
            phone_number,
            learned_at,
        }
    }
}

/// Thread-safe bidirectional LID ↔ phone-number cache.
#[derive(Debug, Default)]
pub struct LidPnMap {
    lid_to_entry: RwLock<HashMap<String, LidPnEntry>>,
    pn_to_entry: RwLock<HashMap<String, LidPnEntry>>,
}

impl LidPnMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current LID for a phone number, if known.
    pub async fn lid_for(&self, phone: &str) -> Option<String> {
        let pn_map = self.pn_to_entry.read().await;
        pn_map.get(phone).map(|e| e.lid.clone())
    }

    /// Phone number for a LID, if known.
    pub async fn phone_for(&self, lid: &str) -> Option<String> {
        let lid_map = self.lid_to_entry.read().await;
        lid_map.get(lid).map(|e| e.phone_number.clone())
    }

    /// Adds or updates a pairing. The LID → entry direction always updates;
    /// the phone → entry direction only accepts entries at least as new as
    /// the stored one.
    pub async fn add(&self, entry: LidPnEntry) {
        let should_update_pn = {
            let pn_map = self.pn_to_entry.read().await;
            match pn_map.get(&entry.phone_number) {
                Some(existing) => existing.learned_at <= entry.learned_at,
                None => true,
            }
        };

        {
            let mut lid_map = self.lid_to_entry.write().await;
            lid_map.insert(entry.lid.clone(), entry.clone());
        }

        if should_update_pn {
            let mut pn_map = self.pn_to_entry.write().await;
            pn_map.insert(entry.phone_number.clone(), entry);
        }
    }

    pub async fn len(&self) -> usize {
        self.lid_to_entry.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.lid_to_entry.read().await.is_empty()
    }
}
