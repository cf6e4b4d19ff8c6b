use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Server suffix for phone-number user JIDs.
pub const DEFAULT_USER_SERVER: &str = "s.whatsapp.net";
/// Server suffix for opaque (LID) user JIDs.
pub const HIDDEN_USER_SERVER: &str = "lid";
pub const GROUP_SERVER: &str = "g.us";
pub const BROADCAST_SERVER: &str = "broadcast";
pub const NEWSLETTER_SERVER: &str = "newsletter";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JidError {
    #[error("invalid JID '{0}': missing @server")]
    MissingServer(String),
    #[error("invalid JID '{0}': bad device suffix")]
    BadDevice(String),
}

/// A WhatsApp protocol identifier. Users exist in two namespaces (phone
/// number and LID); groups, broadcasts and newsletters have a single server
/// suffix each. The optional `:device` suffix addresses one linked device of
/// a user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Jid {
    pub user: String,
    pub server: String,
    pub device: u16,
}

impl Jid {
    pub fn new(user: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            server: server.into(),
            device: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.user.is_empty() && self.server.is_empty()
    }

    pub fn is_group(&self) -> bool {
        self.server == GROUP_SERVER
    }

    pub fn is_broadcast(&self) -> bool {
        self.server == BROADCAST_SERVER
    }

    pub fn is_newsletter(&self) -> bool {
        self.server == NEWSLETTER_SERVER
    }

    pub fn is_lid(&self) -> bool {
        self.server == HIDDEN_USER_SERVER
    }

    pub fn is_phone(&self) -> bool {
        self.server == DEFAULT_USER_SERVER
    }

    /// Returns the JID without its device suffix.
    pub fn to_non_ad(&self) -> Jid {
        Jid {
            user: self.user.clone(),
            server: self.server.clone(),
            device: 0,
        }
    }
}

impl FromStr for Jid {
    type Err = JidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(Jid::default());
        }
        let (user_part, server) = s
            .rsplit_once('@')
            .ok_or_else(|| JidError::MissingServer(s.to_string()))?;

        let (user, device) = match user_part.split_once(':') {
            Some((user, device)) => {
                let device = device
                    .parse::<u16>()
                    .map_err(|_| JidError::BadDevice(s.to_string()))?;
                (user, device)
            }
            None => (user_part, 0),
        };

        Ok(Jid {
            user: user.to_string(),
            server: server.to_string(),
            device,
        })
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return Ok(());
        }
        if self.device > 0 {
            write!(f, "{}:{}@{}", self.user, self.device, self.server)
        } else {
            write!(f, "{}@{}", self.user, self.server)
        }
    }
}
