//! Interactive target selection.
//!
//! When the operator gives neither an alias nor an address, the inventory is
//! printed as a numbered list and one line of input picks the target.

use std::io::{BufRead, Write};

use serde::{Deserialize, Serialize};

use crate::error::{InventoryError, Result};
use crate::inventory::Inventory;
use crate::target::Target;

/// What to do when the operator's choice matches nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum FallbackPolicy {
    /// Connect to the first configured target.
    #[default]
    First,
    /// Report the unmatched choice as an error.
    Fail,
}

impl Inventory {
    /// Writes the numbered list of targets.
    pub fn write_numbered<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        for (i, target) in self.servers.iter().enumerate() {
            writeln!(writer, "{}. {}", i + 1, target)?;
        }
        Ok(())
    }

    /// Prompts for a target and reads the operator's choice.
    ///
    /// The choice is matched case-insensitively against aliases, then as a
    /// 1-based list number. An unmatched or empty choice is handled by
    /// `fallback`.
    pub fn select_interactive<R: BufRead, W: Write>(
        &self,
        reader: &mut R,
        writer: &mut W,
        fallback: FallbackPolicy,
    ) -> Result<&Target> {
        if self.is_empty() {
            return Err(InventoryError::Empty);
        }

        writeln!(writer, "Please select a server to connect to:")?;
        self.write_numbered(writer)?;
        writer.flush()?;

        let mut line = String::new();
        reader.read_line(&mut line)?;
        let choice = line.trim();

        if let Some(target) = self.match_choice(choice) {
            return Ok(target);
        }

        match fallback {
            FallbackPolicy::First => {
                tracing::info!(choice, "No server matched selection, using the first entry");
                self.first()
            }
            FallbackPolicy::Fail => Err(InventoryError::NoMatch(choice.to_string())),
        }
    }

    fn match_choice(&self, choice: &str) -> Option<&Target> {
        if choice.is_empty() {
            return None;
        }
        self.resolve_by_alias(choice).or_else(|| {
            choice
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|i| self.servers.get(i))
        })
    }
}
