//! Transport connector.
//!
//! [`connect`] turns an inventory [`Target`] into an authenticated
//! [`SshSession`] with one session channel open:
//!
//! 1. build the authentication methods (keys are read before dialing)
//! 2. dial `address:port`, optionally bounded by a timeout
//! 3. verify the host key according to [`HostKeyPolicy`]
//! 4. authenticate, trying each method in turn
//! 5. open the session channel

pub mod auth;
pub mod handler;

use std::path::PathBuf;
use std::sync::Arc;

use inventory::Target;
use russh::client;
use thiserror::Error;

pub use auth::{auth_methods, expand_home, AuthMethod};
pub use handler::{ClientHandler, HostKeyPolicy, KnownHostsLookup};

use crate::config::ConnectionConfig;
use crate::session::SshSession;

/// Errors raised while establishing a session.
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("unable to determine the home directory of the current user")]
    HomeDir,

    #[error("unable to use private key {path}: {reason}")]
    Key { path: PathBuf, reason: String },

    #[error("failed to connect to {address}: {source}")]
    Dial {
        address: String,
        #[source]
        source: russh::Error,
    },

    #[error("timed out connecting to {0}")]
    Timeout(String),

    #[error("authentication failed for {user}@{address}")]
    Auth { user: String, address: String },

    #[error("failed to open session: {0}")]
    Session(String),
}

/// Connects and authenticates to `target`, then opens a session channel.
pub async fn connect(target: &Target, options: &ConnectionConfig) -> Result<SshSession, ConnectError> {
    let methods = auth_methods(target)?;
    let endpoint = target.endpoint();

    let config = Arc::new(client::Config::default());
    let handler = ClientHandler::new(target.address.clone(), target.port, options.host_key_policy);

    tracing::debug!(address = %endpoint, user = %target.user, "Dialing");
    let dial = client::connect(config, (target.address.as_str(), target.port), handler);
    let dialed = match options.connect_timeout() {
        Some(limit) => tokio::time::timeout(limit, dial)
            .await
            .map_err(|_| ConnectError::Timeout(endpoint.clone()))?,
        None => dial.await,
    };
    let mut handle = dialed.map_err(|source| ConnectError::Dial {
        address: endpoint.clone(),
        source,
    })?;

    if !authenticate(&mut handle, &target.user, &endpoint, methods).await? {
        return Err(ConnectError::Auth {
            user: target.user.clone(),
            address: endpoint,
        });
    }
    tracing::debug!(address = %endpoint, user = %target.user, "Authenticated");

    let channel = handle
        .channel_open_session()
        .await
        .map_err(|e| ConnectError::Session(e.to_string()))?;

    Ok(SshSession::new(handle, channel, endpoint))
}

/// Tries each method until one is accepted. With no methods, tries `none`.
async fn authenticate(
    handle: &mut client::Handle<ClientHandler>,
    user: &str,
    endpoint: &str,
    methods: Vec<AuthMethod>,
) -> Result<bool, ConnectError> {
    let dial_error = |source: russh::Error| ConnectError::Dial {
        address: endpoint.to_string(),
        source,
    };

    if methods.is_empty() {
        tracing::debug!(user, "No credential configured, trying none authentication");
        return handle.authenticate_none(user).await.map_err(dial_error);
    }

    for method in methods {
        let kind = method.kind();
        let accepted = match method {
            AuthMethod::PublicKey { key, .. } => handle.authenticate_publickey(user, key).await,
            AuthMethod::Password(password) => handle.authenticate_password(user, password).await,
        }
        .map_err(dial_error)?;

        if accepted {
            return Ok(true);
        }
        tracing::debug!(user, method = kind, "Authentication method rejected");
    }
    Ok(false)
}
