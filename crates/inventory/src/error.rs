//! Error types for the inventory crate.

use std::path::PathBuf;

use thiserror::Error;

/// Inventory error type covering loading and target resolution.
#[derive(Debug, Error)]
pub enum InventoryError {
    // Loading errors
    /// The inventory file could not be read.
    #[error("failed to read inventory {path}: {source}")]
    Read {
        /// Path of the inventory file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The inventory file is not valid JSON or does not match the schema.
    #[error("failed to parse inventory {path}: {source}")]
    Parse {
        /// Path of the inventory file.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    // Resolution errors
    /// The inventory contains no servers.
    #[error("inventory contains no servers")]
    Empty,

    /// No target matches the given selector.
    #[error("no server matches '{0}'")]
    NoMatch(String),

    /// Reading the operator's choice failed.
    #[error("failed to read selection: {0}")]
    Prompt(#[from] std::io::Error),
}

/// Result type alias using [`InventoryError`].
pub type Result<T> = std::result::Result<T, InventoryError>;
