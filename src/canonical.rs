//! JID canonicalisation.
//!
//! The same human contact is addressable under a phone-number JID and an
//! opaque LID. Everything persisted keys on one canonical string so that a
//! contact never splits into two chat rows. The rules:
//!
//! - empty input stays empty;
//! - group, broadcast and newsletter JIDs pass through unchanged;
//! - phone-number JIDs lose their device suffix;
//! - LID JIDs are resolved to the phone form through the LID map and, on a
//!   miss, the protocol library's alt-JID lookup. The lookup is effectful
//!   and may fail silently, in which case the LID form is kept. The device
//!   suffix is stripped afterwards either way.

use std::sync::Arc;

use chrono::Utc;
use log::debug;

use crate::lid_map::{LidPnEntry, LidPnMap};
use crate::protocol::ProtocolPort;
use crate::types::jid::{Jid, JidError, DEFAULT_USER_SERVER};

/// Canonicalises JIDs, consulting an in-process LID map before falling back
/// to the protocol library.
#[derive(Clone)]
pub struct Canonicaliser {
    lid_map: Arc<LidPnMap>,
    port: Arc<dyn ProtocolPort>,
}

impl Canonicaliser {
    pub fn new(port: Arc<dyn ProtocolPort>) -> Self {
        Self {
            lid_map: Arc::new(LidPnMap::new()),
            port,
        }
    }

    pub fn lid_map(&self) -> &Arc<LidPnMap> {
        &self.lid_map
    }

    pub async fn canonicalise(&self, jid: &Jid) -> String {
        if jid.is_empty() {
            return String::new();
        }
        if jid.is_group() || jid.is_broadcast() || jid.is_newsletter() {
            return jid.to_string();
        }
        if !jid.is_lid() {
            return jid.to_non_ad().to_string();
        }

        if let Some(phone) = self.lid_map.phone_for(&jid.user).await {
            return Jid::new(phone, DEFAULT_USER_SERVER).to_string();
        }

        match self.port.alt_jid(jid).await {
            Some(alt) if alt.is_phone() && !alt.user.is_empty() => {
                self.lid_map
                    .add(LidPnEntry::new(
                        jid.user.clone(),
                        alt.user.clone(),
                        Utc::now().timestamp(),
                    ))
                    .await;
                alt.to_non_ad().to_string()
            }
            _ => {
                debug!("No phone mapping for LID {jid}, keeping LID form");
                jid.to_non_ad().to_string()
            }
        }
    }

    /// Parses a raw JID string and canonicalises it.
    pub async fn canonicalise_str(&self, raw: &str) -> Result<String, JidError> {
        let jid: Jid = raw.parse()?;
        Ok(self.canonicalise(&jid).await)
    }
}
