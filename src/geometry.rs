//! Geometric checks for placed items.
//!
//! Used to verify finished layouts: every item must lie inside the box and no
//! two items may share volume.

use thiserror::Error;

use crate::packed::PackedItem;
use crate::types::Dimensions;

/// A way in which a packed layout is physically impossible.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutViolation {
    #[error("item {index} ({description}) extends beyond the box interior")]
    OutOfBounds { index: usize, description: String },
    #[error("items {first} and {second} overlap")]
    Overlap { first: usize, second: usize },
    #[error("contents weigh {weight}, box carries at most {capacity}")]
    Overweight { weight: u64, capacity: u64 },
}

/// Checks whether two placed items share volume.
///
/// Touching faces do not count: two items are separate as soon as they are
/// apart along any one axis.
pub fn intersects(a: &PackedItem, b: &PackedItem) -> bool {
    !(a.x() + a.width() <= b.x()
        || b.x() + b.width() <= a.x()
        || a.y() + a.length() <= b.y()
        || b.y() + b.length() <= a.y()
        || a.z() + a.depth() <= b.z()
        || b.z() + b.depth() <= a.z())
}

/// Length of the overlap of `[a1, a2)` and `[b1, b2)`, at least 0.
pub fn overlap_1d(a1: u32, a2: u32, b1: u32, b2: u32) -> u32 {
    a2.min(b2).saturating_sub(a1.max(b1))
}

/// Overlap area of two placed items projected onto the XY plane.
pub fn overlap_area_xy(a: &PackedItem, b: &PackedItem) -> u64 {
    let overlap_x = overlap_1d(a.x(), a.x() + a.width(), b.x(), b.x() + b.width());
    let overlap_y = overlap_1d(a.y(), a.y() + a.length(), b.y(), b.y() + b.length());
    u64::from(overlap_x) * u64::from(overlap_y)
}

/// Checks that the item lies inside a box interior of the given size.
pub fn is_within(item: &PackedItem, inner: Dimensions) -> bool {
    item.x() + item.width() <= inner.width
        && item.y() + item.length() <= inner.length
        && item.z() + item.depth() <= inner.depth
}

/// Validates containment and pairwise separation for a box's items.
pub fn validate_placements(items: &[PackedItem], inner: Dimensions) -> Result<(), LayoutViolation> {
    for (index, item) in items.iter().enumerate() {
        if !is_within(item, inner) {
            return Err(LayoutViolation::OutOfBounds {
                index,
                description: item.item().description().to_string(),
            });
        }
    }

    for (first, a) in items.iter().enumerate() {
        for (offset, b) in items[first + 1..].iter().enumerate() {
            if intersects(a, b) {
                return Err(LayoutViolation::Overlap {
                    first,
                    second: first + 1 + offset,
                });
            }
        }
    }
    Ok(())
}
