//! Pluggable orderings for items, box types and packed boxes.
//!
//! Sorters only influence search order and tie-breaks, never feasibility.
//! Every trait is implemented for plain closures, so a caller can write
//! `packer.set_item_sorter(|a: &Item, b: &Item| a.weight().cmp(&b.weight()))`.

use std::cmp::Ordering;

use crate::model::{BoxType, Item};
use crate::packed::PackedBox;
use crate::types::{Dimensional, Weighted};

/// Order in which items are offered to the packer. `Less` means "pack first".
pub trait ItemSorter: Send + Sync {
    fn compare(&self, a: &Item, b: &Item) -> Ordering;
}

/// Order in which box types are tried. `Less` means "try first".
pub trait BoxSorter: Send + Sync {
    fn compare(&self, a: &BoxType, b: &BoxType) -> Ordering;
}

/// Ranking of packed boxes. `Less` means "better".
pub trait PackedBoxSorter: Send + Sync {
    fn compare(&self, a: &PackedBox, b: &PackedBox) -> Ordering;
}

impl<F> ItemSorter for F
where
    F: Fn(&Item, &Item) -> Ordering + Send + Sync,
{
    fn compare(&self, a: &Item, b: &Item) -> Ordering {
        self(a, b)
    }
}

impl<F> BoxSorter for F
where
    F: Fn(&BoxType, &BoxType) -> Ordering + Send + Sync,
{
    fn compare(&self, a: &BoxType, b: &BoxType) -> Ordering {
        self(a, b)
    }
}

impl<F> PackedBoxSorter for F
where
    F: Fn(&PackedBox, &PackedBox) -> Ordering + Send + Sync,
{
    fn compare(&self, a: &PackedBox, b: &PackedBox) -> Ordering {
        self(a, b)
    }
}

/// Largest volume first, then heaviest, then by description.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultItemSorter;

impl ItemSorter for DefaultItemSorter {
    fn compare(&self, a: &Item, b: &Item) -> Ordering {
        b.volume()
            .cmp(&a.volume())
            .then_with(|| b.weight().cmp(&a.weight()))
            .then_with(|| a.description().cmp(b.description()))
    }
}

/// Smallest inner volume first, then lightest tare, then least spare capacity.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultBoxSorter;

impl BoxSorter for DefaultBoxSorter {
    fn compare(&self, a: &BoxType, b: &BoxType) -> Ordering {
        a.inner_volume()
            .cmp(&b.inner_volume())
            .then_with(|| a.empty_weight().cmp(&b.empty_weight()))
            .then_with(|| a.weight_capacity().cmp(&b.weight_capacity()))
    }
}

/// Most items first, then highest utilisation, then most used volume.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultPackedBoxSorter;

impl PackedBoxSorter for DefaultPackedBoxSorter {
    fn compare(&self, a: &PackedBox, b: &PackedBox) -> Ordering {
        b.item_count()
            .cmp(&a.item_count())
            .then_with(|| {
                b.volume_utilisation()
                    .partial_cmp(&a.volume_utilisation())
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| b.used_volume().cmp(&a.used_volume()))
    }
}
