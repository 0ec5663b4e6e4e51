//! Discrete packing events for live visualisation and tracing.
//!
//! An observer is a pure side channel: it sees what the engine decided but
//! cannot influence any decision. Lookahead simulations never emit events.

use serde::Serialize;

use crate::model::BoxType;
use crate::packed::{PackedBox, PackedItem};
use crate::types::{Dimensional, Positioned, Weighted};

/// Events that occur during packing.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum PackEvent {
    /// A box type was packed as far as possible with the current queue.
    BoxEvaluated {
        reference: String,
        inner: (u32, u32, u32),
        items_packed: usize,
        items_offered: usize,
        utilisation: f64,
    },
    /// An item was placed in the box a round selected.
    ItemPlaced {
        reference: String,
        description: String,
        pos: (u32, u32, u32),
        dims: (u32, u32, u32),
        weight: u32,
    },
    /// An item was left out of the current box evaluation.
    ItemSkipped {
        reference: String,
        description: String,
        reason: String,
    },
    /// A layer was completed.
    LayerFinalized {
        reference: String,
        start_depth: u32,
        depth: u32,
        items: usize,
    },
    /// A round picked its winning box.
    BoxSelected {
        index: usize,
        reference: String,
        items: usize,
        weight: u64,
    },
    /// The weight redistributor tried to move an item between two boxes.
    RedistributionAttempted {
        from: String,
        to: String,
        description: String,
        accepted: bool,
    },
    /// Packing finished.
    Finished { boxes: usize, unpacked: usize },
}

impl PackEvent {
    pub(crate) fn box_evaluated(packed: &PackedBox, items_offered: usize) -> Self {
        PackEvent::BoxEvaluated {
            reference: packed.container().reference().to_string(),
            inner: packed.container().inner().as_tuple(),
            items_packed: packed.item_count(),
            items_offered,
            utilisation: packed.volume_utilisation(),
        }
    }

    pub(crate) fn item_placed(container: &BoxType, packed: &PackedItem) -> Self {
        let pos = packed.position();
        PackEvent::ItemPlaced {
            reference: container.reference().to_string(),
            description: packed.item().description().to_string(),
            pos: (pos.x, pos.y, pos.z),
            dims: packed.dimensions().as_tuple(),
            weight: packed.item().weight(),
        }
    }
}

/// Receives packing events.
pub trait PackObserver: Send + Sync {
    fn on_event(&self, event: &PackEvent);
}

impl<F> PackObserver for F
where
    F: Fn(&PackEvent) + Send + Sync,
{
    fn on_event(&self, event: &PackEvent) {
        self(event)
    }
}

/// Forwards every event to the `log` facade at trace level.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogObserver;

impl PackObserver for LogObserver {
    fn on_event(&self, event: &PackEvent) {
        log::trace!("[EVENT] {event:?}");
    }
}
