//! Layer-based 3D bin packing.
//!
//! Items are packed into as few boxes as possible. Every box is filled
//! bottom-up in horizontal layers, items respect their rotation policy and
//! the box weight limit, and small results are rebalanced so that boxes end
//! up with similar weights.
//!
//! ```
//! use boxstack::{BoxType, Item, Packer, Rotation};
//!
//! let mut packer = Packer::new();
//! packer.add_box(BoxType::new("Column", (1, 1, 3), 0, (1, 1, 3), 3).unwrap());
//! packer.add_item(Item::new("Cube", (1, 1, 1), 1, Rotation::Never).unwrap(), 4);
//!
//! let packed = packer.pack().unwrap();
//! let counts: Vec<usize> = packed.iter().map(|b| b.item_count()).collect();
//! assert_eq!(counts, [2, 2]);
//! ```

pub mod api;
pub mod config;
mod context;
pub mod error;
pub mod events;
pub mod geometry;
mod item_list;
mod layer_packer;
mod layer_stabiliser;
pub mod model;
mod orientation;
pub mod packed;
pub mod packer;
pub mod sorting;
pub mod types;
mod volume_packer;
mod weight_redistributor;

pub use error::{PackingError, Result};
pub use events::{LogObserver, PackEvent, PackObserver};
pub use model::{BoxType, Item, MaxPerBox, PlacementConstraint, Rotation, ValidationError};
pub use packed::{OrientatedItem, PackedBox, PackedBoxList, PackedItem, PackedItemList, PackedLayer};
pub use packer::{Packer, PackingConfig, PackingConfigBuilder, PackingOutcome, UnpackedItem, UnpackedReason};
pub use sorting::{
    BoxSorter, DefaultBoxSorter, DefaultItemSorter, DefaultPackedBoxSorter, ItemSorter, PackedBoxSorter,
};
pub use types::{Dimensional, Dimensions, Position, Positioned, Weighted};
