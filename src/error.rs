//! Error types for the packing engine.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::model::Item;

/// Result type alias for packing operations.
pub type Result<T> = std::result::Result<T, PackingError>;

/// Fatal packing failures.
///
/// Local dead ends (no orientation fits, an empty layer, a rejected trial
/// repack) are handled inside the engine and never surface here.
#[derive(Debug, Clone, Error)]
pub enum PackingError {
    /// The item does not fit any configured box, even alone.
    #[error("item {} is too large to fit into any box", .item.description())]
    ItemTooLarge { item: Arc<Item> },

    /// A packing round placed nothing although items remained.
    #[error("no boxes available for {} remaining item(s)", .items.len())]
    NoBoxesAvailable { items: Vec<Arc<Item>> },

    /// The configured time budget was exceeded.
    #[error("packing timed out after {elapsed:?} (budget {budget:?})")]
    Timeout { elapsed: Duration, budget: Duration },
}

impl PackingError {
    /// The items this failure is about; empty for timeouts.
    pub fn affected_items(&self) -> &[Arc<Item>] {
        match self {
            PackingError::ItemTooLarge { item } => std::slice::from_ref(item),
            PackingError::NoBoxesAvailable { items } => items,
            PackingError::Timeout { .. } => &[],
        }
    }
}
