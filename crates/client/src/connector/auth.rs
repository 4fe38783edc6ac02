//! Authentication method selection.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use inventory::{Credential, Target};
use russh_keys::key::KeyPair;

use super::ConnectError;

/// One way to authenticate, ready to present to the server.
pub enum AuthMethod {
    /// A decoded private key.
    PublicKey { path: PathBuf, key: Arc<KeyPair> },
    /// A password.
    Password(String),
}

impl fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMethod::PublicKey { path, .. } => {
                f.debug_struct("PublicKey").field("path", path).finish_non_exhaustive()
            }
            AuthMethod::Password(_) => f.write_str("Password([REDACTED])"),
        }
    }
}

impl AuthMethod {
    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthMethod::PublicKey { .. } => "publickey",
            AuthMethod::Password(_) => "password",
        }
    }
}

/// Expands a leading `~` to the home directory of the user running the process.
pub fn expand_home(path: &str) -> Result<PathBuf, ConnectError> {
    let rest = if path == "~" {
        ""
    } else if let Some(rest) = path.strip_prefix("~/") {
        rest
    } else {
        return Ok(PathBuf::from(path));
    };

    let home = dirs::home_dir().ok_or(ConnectError::HomeDir)?;
    Ok(home.join(rest))
}

fn load_key(path: &Path) -> Result<KeyPair, ConnectError> {
    let contents = fs::read_to_string(path).map_err(|e| ConnectError::Key {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    russh_keys::decode_secret_key(&contents, None).map_err(|e| ConnectError::Key {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Builds the authentication methods for `target`.
///
/// A key credential is read and decoded here, so an unusable key fails
/// before anything is dialed. An empty list means the server decides.
pub fn auth_methods(target: &Target) -> Result<Vec<AuthMethod>, ConnectError> {
    match target.credential() {
        Credential::Key(raw) => {
            let path = expand_home(&raw)?;
            let key = load_key(&path)?;
            tracing::debug!(path = %path.display(), "Loaded private key");
            Ok(vec![AuthMethod::PublicKey {
                path,
                key: Arc::new(key),
            }])
        }
        Credential::Password(password) => Ok(vec![AuthMethod::Password(password)]),
        Credential::None => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn target(use_key: bool, private_key: Option<&str>, password: Option<&str>) -> Target {
        Target {
            alias: "db".to_string(),
            address: "10.0.0.5".to_string(),
            port: 22,
            user: "ops".to_string(),
            password: password.map(str::to_string),
            private_key: private_key.map(str::to_string),
            use_key,
        }
    }

    #[test]
    fn test_expand_home_plain_path_unchanged() {
        assert_eq!(
            expand_home("/etc/ssh/id").unwrap(),
            PathBuf::from("/etc/ssh/id")
        );
        assert_eq!(expand_home("keys/id").unwrap(), PathBuf::from("keys/id"));
    }

    #[test]
    fn test_expand_home_uses_process_home() {
        let Some(home) = dirs::home_dir() else {
            return;
        };
        assert_eq!(expand_home("~/.ssh/id_ed25519").unwrap(), home.join(".ssh/id_ed25519"));
        assert_eq!(expand_home("~").unwrap(), home.join(""));
    }

    #[test]
    fn test_expand_home_ignores_other_users() {
        assert_eq!(
            expand_home("~ops/.ssh/id").unwrap(),
            PathBuf::from("~ops/.ssh/id")
        );
    }

    #[test]
    fn test_missing_key_is_key_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("absent");
        let target = target(true, missing.to_str(), Some("ignored"));

        match auth_methods(&target) {
            Err(ConnectError::Key { path, .. }) => assert_eq!(path, missing),
            other => panic!("expected key error, got {:?}", other),
        }
    }

    #[test]
    fn test_garbage_key_is_key_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("id_bogus");
        fs::write(&path, "not a private key").unwrap();
        let target = target(true, path.to_str(), None);

        assert!(matches!(
            auth_methods(&target),
            Err(ConnectError::Key { .. })
        ));
    }

    #[test]
    fn test_password_method() {
        let methods = auth_methods(&target(false, None, Some("hunter2"))).unwrap();
        assert_eq!(methods.len(), 1);
        assert_eq!(methods[0].kind(), "password");
        assert_eq!(format!("{:?}", methods[0]), "Password([REDACTED])");
    }

    #[test]
    fn test_empty_password_yields_no_methods() {
        let methods = auth_methods(&target(false, None, Some(""))).unwrap();
        assert!(methods.is_empty());

        let methods = auth_methods(&target(false, None, None)).unwrap();
        assert!(methods.is_empty());
    }
}
