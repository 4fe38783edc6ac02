//! # termhop Inventory Library
//!
//! This crate holds the host inventory for termhop: the list of remote
//! targets an operator can open a shell on, and the rules for picking one.
//!
//! ## Overview
//!
//! - **Targets**: address, port, user and credential for one host
//! - **Lookup**: by alias (case-insensitive) or by exact address
//! - **Selection**: numbered interactive pick-list with an explicit fallback policy
//!
//! ## Example Usage
//!
//! ```rust
//! use inventory::{Credential, Inventory};
//!
//! let inventory: Inventory = serde_json::from_str(r#"{
//!     "servers": [
//!         {"alias": "db1", "address": "10.0.0.5", "port": 22, "user": "ops",
//!          "private_key": "~/.ssh/id_ed25519", "use_key": true}
//!     ]
//! }"#).unwrap();
//!
//! let target = inventory.resolve("DB1").unwrap();
//! assert_eq!(target.endpoint(), "10.0.0.5:22");
//! assert_eq!(target.credential(), Credential::Key("~/.ssh/id_ed25519".into()));
//! ```
//!
//! ## Modules
//!
//! - [`target`]: Target records and credentials
//! - [`inventory`]: Inventory loading and lookup
//! - [`select`]: Interactive selection
//! - [`error`]: Error types

pub mod error;
pub mod inventory;
pub mod select;
pub mod target;

pub use error::{InventoryError, Result};
pub use inventory::Inventory;
pub use select::FallbackPolicy;
pub use target::{Credential, Target, DEFAULT_PORT};
