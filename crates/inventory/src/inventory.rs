//! Inventory loading and lookup.
//!
//! The inventory is a JSON document with a single `servers` list:
//!
//! ```json
//! {
//!   "servers": [
//!     {"alias": "db1", "address": "10.0.0.5", "port": 22, "user": "ops",
//!      "private_key": "~/.ssh/id_ed25519", "use_key": true}
//!   ]
//! }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{InventoryError, Result};
use crate::target::Target;

/// The list of known targets.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Inventory {
    /// Configured targets, in file order.
    #[serde(default)]
    pub servers: Vec<Target>,
}

impl Inventory {
    /// Creates an inventory from a list of targets.
    pub fn new(servers: Vec<Target>) -> Self {
        Self { servers }
    }

    /// Loads an inventory from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let contents = fs::read_to_string(path).map_err(|source| InventoryError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let inventory: Inventory =
            serde_json::from_str(&contents).map_err(|source| InventoryError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        tracing::debug!(
            path = %path.display(),
            servers = inventory.servers.len(),
            "Loaded inventory"
        );
        Ok(inventory)
    }

    /// Finds a target by alias, ignoring ASCII and Unicode case.
    pub fn resolve_by_alias(&self, name: &str) -> Option<&Target> {
        let wanted = name.to_lowercase();
        self.servers
            .iter()
            .find(|t| t.alias.to_lowercase() == wanted)
    }

    /// Finds a target by exact address.
    pub fn resolve_by_address(&self, address: &str) -> Option<&Target> {
        self.servers.iter().find(|t| t.address == address)
    }

    /// Resolves a free-form selector: alias first, then address.
    pub fn resolve(&self, selector: &str) -> Result<&Target> {
        self.resolve_by_alias(selector)
            .or_else(|| self.resolve_by_address(selector))
            .ok_or_else(|| InventoryError::NoMatch(selector.to_string()))
    }

    /// Returns every target for presentation.
    pub fn list_all(&self) -> &[Target] {
        &self.servers
    }

    /// Returns the first configured target.
    pub fn first(&self) -> Result<&Target> {
        self.servers.first().ok_or(InventoryError::Empty)
    }

    /// Returns the number of targets.
    pub fn len(&self) -> usize {
        self.servers.len()
    }

    /// Returns whether the inventory has no targets.
    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}
