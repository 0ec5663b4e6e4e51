//! Builds one horizontal layer of a box.
//!
//! Items are laid out in rows along the x axis starting at the cursor. When a
//! row is full the cursor moves along y by the row's length. Above each placed
//! item the remaining layer height is filled with smaller items.

use std::sync::Arc;

use crate::context::PackingContext;
use crate::events::PackEvent;
use crate::item_list::ItemList;
use crate::model::{BoxType, Item};
use crate::orientation::{OrientationFactory, Placement};
use crate::packed::{OrientatedItem, PackedItem, PackedItemList, PackedLayer};
use crate::types::{Dimensional, Dimensions, Position, Weighted};

pub(crate) struct LayerPacker<'a> {
    container: &'a BoxType,
    factory: OrientationFactory<'a>,
    ctx: PackingContext<'a>,
}

impl<'a> LayerPacker<'a> {
    pub fn new(container: &'a BoxType, ctx: PackingContext<'a>, single_pass: bool) -> Self {
        Self {
            container,
            factory: OrientationFactory::new(container, ctx, single_pass),
            ctx,
        }
    }

    /// Marks `container` as the real box turned a quarter around z.
    pub fn with_swapped_frame(mut self, swapped_frame: bool) -> Self {
        self.factory = self.factory.with_swapped_frame(swapped_frame);
        self
    }

    /// Packs one layer starting at height `start_z`.
    ///
    /// `guideline_depth` is the target layer height, or 0 if unknown. Items
    /// that can never go into this box (too heavy, rejected by their rule, or
    /// not fitting an empty layer) are removed from `items`; everything that
    /// merely did not fit this layer is left in `items` for the next one.
    pub fn pack_layer(
        &self,
        items: &mut ItemList,
        packed: &mut PackedItemList,
        start_z: u32,
        guideline_depth: u32,
    ) -> PackedLayer {
        let inner = self.container.inner();
        let depth_limit = if guideline_depth > 0 {
            guideline_depth
        } else {
            inner.depth.saturating_sub(start_z)
        };

        let mut layer = PackedLayer::new();
        let mut x = 0;
        let mut y = 0;
        let mut row_length = 0;
        let mut prev: Option<OrientatedItem> = None;
        let mut skipped: Vec<Arc<Item>> = Vec::new();

        while let Some(item) = items.extract() {
            if let Err(reason) = self.admits(&item, packed) {
                log::debug!("{} can never go into {}: {reason}", item.description(), self.container);
                self.report_skip(&item, reason);
                continue;
            }

            let placement = Placement {
                space: Dimensions::new(inner.width - x, inner.length - y, depth_limit),
                position: Position::new(x, y, start_z),
                row_length,
                packed,
            };

            if let Some(orientated) = self.factory.best_orientation(&item, prev.as_ref(), items, placement) {
                let placed = PackedItem::from_orientated(orientated.clone(), Position::new(x, y, start_z));
                log::trace!("placed {orientated} at ({x}, {y}, {start_z})");
                row_length = row_length.max(placed.length());
                layer.insert(placed.clone());
                packed.insert(placed.clone());

                self.fill_above(&placed, &orientated, items, packed, &mut layer, guideline_depth, row_length);

                x += placed.width();
                prev = Some(orientated);
                if items.is_empty() && !skipped.is_empty() {
                    items.requeue_front(std::mem::take(&mut skipped));
                }
                continue;
            }

            if layer.is_empty() {
                log::debug!("{} does not fit an empty layer, skipping for good", item.description());
                self.report_skip(&item, "does not fit an empty layer");
                continue;
            }

            if !items.is_empty() {
                log::trace!("{} does not fit, skipping for now", item.description());
                skipped.push(Arc::clone(&item));
                // Identical items would fail the same way; keep the last one to trigger the row reset.
                while items.len() > 1 && items.top().is_some_and(|next| is_same_kind(next, &item)) {
                    if let Some(next) = items.extract() {
                        skipped.push(next);
                    }
                }
                continue;
            }

            if x > 0 {
                log::trace!("row full at y = {y}, starting a new row");
                y += row_length;
                x = 0;
                row_length = 0;
                prev = None;
                skipped.push(item);
                items.requeue_front(std::mem::take(&mut skipped));
                continue;
            }

            log::trace!("nothing else fits at z = {start_z}, closing layer");
            skipped.push(item);
            items.requeue_front(std::mem::take(&mut skipped));
            return layer;
        }

        layer
    }

    /// Stacks further items on top of `base`, within its footprint and the
    /// layer's height. Items that do not fit are put back in front.
    #[allow(clippy::too_many_arguments)]
    fn fill_above(
        &self,
        base: &PackedItem,
        base_orientation: &OrientatedItem,
        items: &mut ItemList,
        packed: &mut PackedItemList,
        layer: &mut PackedLayer,
        guideline_depth: u32,
        row_length: u32,
    ) {
        let layer_depth = if guideline_depth > 0 {
            guideline_depth
        } else {
            layer.depth()
        };
        let mut stackable = layer_depth.saturating_sub(base.depth());
        let mut z = base.top();
        let mut stack_skipped: Vec<Arc<Item>> = Vec::new();

        while stackable > 0 {
            let Some(candidate) = items.extract() else {
                break;
            };

            let stacked = if self.admits(&candidate, packed).is_ok() {
                let placement = Placement {
                    space: Dimensions::new(base.width(), base.length(), stackable),
                    position: Position::new(base.x(), base.y(), z),
                    row_length,
                    packed,
                };
                self.factory
                    .best_orientation(&candidate, Some(base_orientation), items, placement)
            } else {
                None
            };

            match stacked {
                Some(orientated) => {
                    let placed = PackedItem::from_orientated(orientated, Position::new(base.x(), base.y(), z));
                    log::trace!("stacked {} on {} at z = {z}", placed.item().description(), base.item().description());
                    stackable -= placed.depth();
                    z += placed.depth();
                    layer.insert(placed.clone());
                    packed.insert(placed);
                }
                None => {
                    stack_skipped.push(Arc::clone(&candidate));
                    while items.top().is_some_and(|next| is_same_kind(next, &candidate)) {
                        if let Some(next) = items.extract() {
                            stack_skipped.push(next);
                        }
                    }
                }
            }
        }

        if !stack_skipped.is_empty() {
            items.requeue_front(stack_skipped);
        }
    }

    /// Box-level checks that do not depend on position.
    fn admits(&self, item: &Item, packed: &PackedItemList) -> Result<(), &'static str> {
        let capacity = u64::from(self.container.weight_capacity());
        if u64::from(item.weight()) > capacity.saturating_sub(packed.weight()) {
            return Err("exceeds remaining weight");
        }
        if self.container.is_working_volume() {
            return Ok(());
        }
        match item.constraint() {
            Some(rule) if !rule.can_be_packed_in_box(item, packed, self.container) => {
                Err("rejected by placement rule")
            }
            _ => Ok(()),
        }
    }

    fn report_skip(&self, item: &Item, reason: &str) {
        self.ctx.emit(|| PackEvent::ItemSkipped {
            reference: self.container.reference().to_string(),
            description: item.description().to_string(),
            reason: reason.to_string(),
        });
    }
}

/// Identical dimensions and rotation policy: such items always fail alike.
fn is_same_kind(a: &Item, b: &Item) -> bool {
    a.dimensions() == b.dimensions() && a.rotation() == b.rotation()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::PackingCaches;
    use crate::model::{MaxPerBox, Rotation};
    use crate::packer::PackingConfig;
    use crate::types::Positioned;

    fn item(dims: (u32, u32, u32), weight: u32) -> Arc<Item> {
        Arc::new(Item::new("Item", dims, weight, Rotation::Never).unwrap())
    }

    fn container(inner: (u32, u32, u32), capacity: u32) -> BoxType {
        BoxType::new("Box", inner, 0, inner, capacity).unwrap()
    }

    fn positions(layer: &PackedLayer) -> Vec<(u32, u32, u32)> {
        layer
            .items()
            .iter()
            .map(|p| {
                let pos = p.position();
                (pos.x, pos.y, pos.z)
            })
            .collect()
    }

    #[test]
    fn fills_rows_then_starts_new_row() {
        let config = PackingConfig::default();
        let caches = PackingCaches::new();
        let ctx = PackingContext::new(&config, &caches);
        let container = container((10, 10, 10), 1_000);
        let packer = LayerPacker::new(&container, ctx, true);

        let mut items = ItemList::from_ordered((0..4).map(|_| item((5, 5, 5), 1)));
        let mut packed = PackedItemList::new();
        let layer = packer.pack_layer(&mut items, &mut packed, 0, 0);

        assert!(items.is_empty());
        assert_eq!(positions(&layer), [(0, 0, 0), (5, 0, 0), (0, 5, 0), (5, 5, 0)]);
        assert_eq!(layer.depth(), 5);
        assert_eq!(packed.len(), 4);
    }

    #[test]
    fn stacks_items_above_shorter_ones_up_to_guideline() {
        let config = PackingConfig::default();
        let caches = PackingCaches::new();
        let ctx = PackingContext::new(&config, &caches);
        let container = container((10, 10, 10), 1_000);
        let packer = LayerPacker::new(&container, ctx, true);

        let mut items = ItemList::from_ordered(vec![item((5, 10, 10), 1), item((5, 10, 5), 1), item((5, 10, 5), 1)]);
        let mut packed = PackedItemList::new();
        let layer = packer.pack_layer(&mut items, &mut packed, 0, 10);

        assert!(items.is_empty());
        assert_eq!(positions(&layer), [(0, 0, 0), (5, 0, 0), (5, 0, 5)]);
        assert_eq!(layer.depth(), 10);
    }

    #[test]
    fn leaves_unfitted_items_queued_for_next_layer() {
        let config = PackingConfig::default();
        let caches = PackingCaches::new();
        let ctx = PackingContext::new(&config, &caches);
        let container = container((10, 10, 10), 1_000);
        let packer = LayerPacker::new(&container, ctx, true);

        let mut items = ItemList::from_ordered((0..3).map(|_| item((10, 10, 5), 1)));
        let mut packed = PackedItemList::new();
        let layer = packer.pack_layer(&mut items, &mut packed, 0, 0);

        assert_eq!(layer.len(), 1);
        assert_eq!(items.len(), 2, "the rest waits for the next layer");
    }

    #[test]
    fn drops_items_over_the_weight_budget() {
        let config = PackingConfig::default();
        let caches = PackingCaches::new();
        let ctx = PackingContext::new(&config, &caches);
        let container = container((10, 10, 10), 10);
        let packer = LayerPacker::new(&container, ctx, true);

        let mut items = ItemList::from_ordered(vec![item((5, 5, 5), 6), item((5, 5, 5), 6)]);
        let mut packed = PackedItemList::new();
        let layer = packer.pack_layer(&mut items, &mut packed, 0, 0);

        assert_eq!(layer.len(), 1);
        assert!(items.is_empty(), "too heavy for this box, not retried");
        assert_eq!(packed.weight(), 6);
    }

    #[test]
    fn drops_items_that_do_not_fit_an_empty_layer() {
        let config = PackingConfig::default();
        let caches = PackingCaches::new();
        let ctx = PackingContext::new(&config, &caches);
        let container = container((10, 10, 10), 1_000);
        let packer = LayerPacker::new(&container, ctx, true);

        let mut items = ItemList::from_ordered(vec![item((20, 20, 20), 1), item((5, 5, 5), 1)]);
        let mut packed = PackedItemList::new();
        let layer = packer.pack_layer(&mut items, &mut packed, 0, 0);

        assert_eq!(layer.len(), 1);
        assert!(items.is_empty());
    }

    #[test]
    fn respects_box_level_placement_rule() {
        let config = PackingConfig::default();
        let caches = PackingCaches::new();
        let ctx = PackingContext::new(&config, &caches);
        let container = container((10, 10, 10), 1_000);
        let packer = LayerPacker::new(&container, ctx, true);

        let limited = |_: i32| Arc::new(Item::new("Mug", (2, 2, 2), 1, Rotation::Never).unwrap().with_constraint(MaxPerBox::new(2)));
        let mut items = ItemList::from_ordered((0..4).map(limited));
        let mut packed = PackedItemList::new();
        packer.pack_layer(&mut items, &mut packed, 0, 0);

        assert_eq!(packed.len(), 2);
    }

    #[test]
    fn stacks_with_lookahead_on_a_base_shorter_than_the_row() {
        let config = PackingConfig::default();
        let caches = PackingCaches::new();
        let ctx = PackingContext::new(&config, &caches);
        let container = container((20, 20, 10), 1_000);
        let packer = LayerPacker::new(&container, ctx, false);

        let mut items = ItemList::from_ordered(vec![
            item((10, 20, 10), 1),
            item((10, 10, 5), 1),
            Arc::new(Item::new("Item", (4, 3, 5), 1, Rotation::BestFit).unwrap()),
            item((1, 1, 1), 1),
        ]);
        let mut packed = PackedItemList::new();
        let layer = packer.pack_layer(&mut items, &mut packed, 0, 0);

        assert_eq!(&positions(&layer)[..2], [(0, 0, 0), (10, 0, 0)]);
        assert_eq!(positions(&layer)[2], (10, 0, 5), "stacked on the shorter base");
        assert_eq!(layer.len() + items.len(), 4);
        assert!(crate::geometry::validate_placements(packed.as_slice(), container.inner()).is_ok());
    }
}
