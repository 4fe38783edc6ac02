//! Server identity checks for the SSH client.

use async_trait::async_trait;
use russh::client;
use russh_keys::key::PublicKey;
use serde::{Deserialize, Serialize};

/// How the server's host key is verified.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostKeyPolicy {
    /// Trust any host key.
    #[default]
    AcceptAny,
    /// Require a matching entry in `~/.ssh/known_hosts`.
    KnownHosts,
    /// Record unknown hosts in `~/.ssh/known_hosts`, reject changed keys.
    AcceptNew,
}

/// Outcome of looking a host key up in `known_hosts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnownHostsLookup {
    Match,
    Unknown,
    Changed,
}

impl HostKeyPolicy {
    /// Decides whether to trust a key given its `known_hosts` lookup.
    ///
    /// Returns the decision and whether the key should be recorded.
    pub fn decide(self, lookup: KnownHostsLookup) -> (bool, bool) {
        match (self, lookup) {
            (HostKeyPolicy::AcceptAny, _) => (true, false),
            (_, KnownHostsLookup::Match) => (true, false),
            (HostKeyPolicy::AcceptNew, KnownHostsLookup::Unknown) => (true, true),
            (HostKeyPolicy::KnownHosts, KnownHostsLookup::Unknown) => (false, false),
            (_, KnownHostsLookup::Changed) => (false, false),
        }
    }
}

/// russh event handler for one connection.
pub struct ClientHandler {
    host: String,
    port: u16,
    policy: HostKeyPolicy,
}

impl ClientHandler {
    pub fn new(host: impl Into<String>, port: u16, policy: HostKeyPolicy) -> Self {
        Self {
            host: host.into(),
            port,
            policy,
        }
    }

    fn lookup(&self, key: &PublicKey) -> KnownHostsLookup {
        match russh_keys::check_known_hosts(&self.host, self.port, key) {
            Ok(true) => KnownHostsLookup::Match,
            Ok(false) => KnownHostsLookup::Unknown,
            Err(russh_keys::Error::KeyChanged { line }) => {
                tracing::error!(
                    host = %self.host,
                    port = self.port,
                    line,
                    "Host key does not match known_hosts entry"
                );
                KnownHostsLookup::Changed
            }
            Err(e) => {
                tracing::warn!(host = %self.host, error = %e, "Unable to read known_hosts");
                KnownHostsLookup::Unknown
            }
        }
    }
}

#[async_trait]
impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(&mut self, server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        let fingerprint = server_public_key.fingerprint();

        if self.policy == HostKeyPolicy::AcceptAny {
            tracing::warn!(
                host = %self.host,
                port = self.port,
                %fingerprint,
                "Accepting host key without verification"
            );
            return Ok(true);
        }

        let lookup = self.lookup(server_public_key);
        let (trusted, learn) = self.policy.decide(lookup);

        if learn {
            match russh_keys::learn_known_hosts(&self.host, self.port, server_public_key) {
                Ok(()) => {
                    tracing::info!(host = %self.host, %fingerprint, "Added host key to known_hosts");
                }
                Err(e) => {
                    tracing::warn!(host = %self.host, error = %e, "Failed to record host key");
                }
            }
        }

        if !trusted {
            tracing::warn!(host = %self.host, %fingerprint, ?lookup, "Rejected host key");
        }
        Ok(trusted)
    }
}
