//! Target records.
//!
//! A [`Target`] is one entry of the inventory: where to connect, as whom,
//! and with which credential.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Default SSH port used when an entry omits `port`.
pub const DEFAULT_PORT: u16 = 22;

fn default_port() -> u16 {
    DEFAULT_PORT
}

/// A remote host the operator can connect to.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Target {
    /// Short name, unique within the inventory.
    pub alias: String,
    /// Host name or IP address.
    pub address: String,
    /// SSH port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Remote user name.
    pub user: String,
    /// Password, used when key authentication is off.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Path to a private key, may start with `~`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    /// Authenticate with `private_key` instead of `password`.
    #[serde(default)]
    pub use_key: bool,
}

/// The credential actionable for a single connection attempt.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// Private key at the given (unexpanded) path.
    Key(String),
    /// Password authentication.
    Password(String),
    /// Nothing configured; the server decides.
    None,
}

impl Target {
    /// Returns `address:port`.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    /// Returns the credential to use.
    ///
    /// The key flag wins over a password. A key flag with no path still
    /// yields `Credential::Key` with an empty path so the connector reports
    /// it as an unreadable key rather than silently falling back.
    pub fn credential(&self) -> Credential {
        if self.use_key {
            return Credential::Key(self.private_key.clone().unwrap_or_default());
        }
        match self.password.as_deref() {
            Some(password) if !password.is_empty() => Credential::Password(password.to_string()),
            _ => Credential::None,
        }
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("alias", &self.alias)
            .field("address", &self.address)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("private_key", &self.private_key)
            .field("use_key", &self.use_key)
            .finish()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Key(path) => f.debug_tuple("Key").field(path).finish(),
            Credential::Password(_) => f.write_str("Password([REDACTED])"),
            Credential::None => f.write_str("None"),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}:{})", self.alias, self.address, self.port)
    }
}
