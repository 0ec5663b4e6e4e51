//! Orientation selection for a single placement.
//!
//! `OrientationFactory` enumerates the rotations an item may take in the free
//! envelope, splits them by stability and hands the usable ones to
//! `OrientationSorter`, which ranks them:
//!
//! 1. exact fit on remaining width, then length, then depth
//! 2. whether the next queued item still fits beside the candidate
//! 3. how many of the next few items a simulated sub-pack would add
//! 4. smallest remaining gap, then largest footprint

use std::cmp::Ordering;
use std::sync::Arc;

use crate::context::{LookaheadKey, PackingContext};
use crate::item_list::ItemList;
use crate::model::{BoxType, Item};
use crate::packed::{OrientatedItem, PackedItemList};
use crate::types::{Dimensional, Dimensions, Position, Weighted};
use crate::volume_packer::VolumePacker;

/// The placement situation an orientation is chosen for.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Placement<'p> {
    /// Free width, length and depth at the cursor.
    pub space: Dimensions,
    pub position: Position,
    /// Length of the longest item in the current row so far.
    pub row_length: u32,
    pub packed: &'p PackedItemList,
}

pub(crate) struct OrientationFactory<'a> {
    container: &'a BoxType,
    ctx: PackingContext<'a>,
    single_pass: bool,
    /// Set when `container` is the real box turned a quarter, so orientations
    /// are mapped into that frame and stay legal once mapped back.
    swapped_frame: bool,
}

impl<'a> OrientationFactory<'a> {
    pub fn new(container: &'a BoxType, ctx: PackingContext<'a>, single_pass: bool) -> Self {
        Self {
            container,
            ctx,
            single_pass,
            swapped_frame: false,
        }
    }

    pub fn with_swapped_frame(mut self, swapped_frame: bool) -> Self {
        self.swapped_frame = swapped_frame;
        self
    }

    fn to_frame(&self, dims: Dimensions) -> Dimensions {
        if self.swapped_frame {
            dims.swapped_footprint()
        } else {
            dims
        }
    }

    /// The item's permitted rotations, expressed in the packing frame.
    fn permutations_in_frame(&self, item: &Item) -> Vec<Dimensions> {
        item.permutations().into_iter().map(|dims| self.to_frame(dims)).collect()
    }

    /// Picks the best usable orientation, or `None` if nothing fits.
    pub fn best_orientation(
        &self,
        item: &Arc<Item>,
        prev: Option<&OrientatedItem>,
        next_items: &ItemList,
        placement: Placement<'_>,
    ) -> Option<OrientatedItem> {
        let possible = self.possible_orientations(item, prev, placement);
        let usable = self.usable_orientations(item, possible);

        let sorter = OrientationSorter {
            factory: self,
            placement,
            next_items,
        };

        let mut best: Option<OrientatedItem> = None;
        for candidate in usable {
            let better = match &best {
                None => true,
                Some(current) => sorter.compare(&candidate, current) == Ordering::Less,
            };
            if better {
                best = Some(candidate);
            }
        }

        if let Some(chosen) = &best {
            log::trace!("chose {chosen} at {:?}", placement.position);
        }
        best
    }

    /// Orientations that fit the envelope and pass the item's placement rule.
    ///
    /// Runs of identical items reuse the previous item's orientation when the
    /// rotation policy allows it.
    pub fn possible_orientations(
        &self,
        item: &Arc<Item>,
        prev: Option<&OrientatedItem>,
        placement: Placement<'_>,
    ) -> Vec<OrientatedItem> {
        // to_frame is its own inverse, so it also maps the previous orientation back.
        let permutations = match prev {
            Some(prev) if prev.is_same_shape_as(item) && item.allows_orientation(self.to_frame(prev.dimensions())) => {
                vec![prev.dimensions()]
            }
            _ => self.permutations_in_frame(item),
        };

        permutations
            .into_iter()
            .filter(|dims| dims.fits_within(&placement.space))
            .filter(|dims| self.passes_placement_rule(item, *dims, placement))
            .map(|dims| OrientatedItem::new(Arc::clone(item), dims))
            .collect()
    }

    fn passes_placement_rule(&self, item: &Item, dims: Dimensions, placement: Placement<'_>) -> bool {
        if self.container.is_working_volume() {
            return true;
        }
        match item.constraint() {
            Some(rule) => rule.can_be_packed_at(item, self.container, placement.packed, placement.position, dims),
            None => true,
        }
    }

    /// Stable orientations if there are any. Unstable ones are only offered
    /// when the item could never stand stably in this box type anyway.
    pub fn usable_orientations(&self, item: &Item, possible: Vec<OrientatedItem>) -> Vec<OrientatedItem> {
        let (stable, unstable): (Vec<_>, Vec<_>) = possible
            .into_iter()
            .partition(|o| self.is_stable_here(o));

        if !stable.is_empty() {
            return stable;
        }
        if !unstable.is_empty() && !self.has_stable_orientation_in_empty_box(item) {
            return unstable;
        }
        Vec::new()
    }

    /// Tip angle above the threshold, or fully supported by the box's full depth.
    fn is_stable_here(&self, orientation: &OrientatedItem) -> bool {
        orientation.is_stable() || orientation.depth() == self.container.inner().depth
    }

    /// Evaluated in the box's own frame so both trial frames share cache entries.
    fn has_stable_orientation_in_empty_box(&self, item: &Item) -> bool {
        let inner = self.to_frame(self.container.inner());
        let key = (item.dimensions(), item.rotation(), inner);
        self.ctx.caches.stable_in_empty_box(key, || {
            item.permutations()
                .into_iter()
                .filter(|dims| dims.fits_within(&inner))
                .any(|dims| dims.is_stable() || dims.depth == inner.depth)
        })
    }
}

/// Ranks two candidate orientations for the same placement. `Less` is better.
pub(crate) struct OrientationSorter<'f, 'a> {
    factory: &'f OrientationFactory<'a>,
    placement: Placement<'f>,
    next_items: &'f ItemList,
}

impl OrientationSorter<'_, '_> {
    pub fn compare(&self, a: &OrientatedItem, b: &OrientatedItem) -> Ordering {
        let space = self.placement.space;

        let a_left = remaining(space, a);
        let b_left = remaining(space, b);

        // Exact fits first, axis by axis.
        for (a_gap, b_gap) in [
            (a_left.width, b_left.width),
            (a_left.length, b_left.length),
            (a_left.depth, b_left.depth),
        ] {
            match (a_gap == 0, b_gap == 0) {
                (true, false) => return Ordering::Less,
                (false, true) => return Ordering::Greater,
                _ => {}
            }
        }

        if let Some(next) = self.next_items.top() {
            let a_fits = self.next_item_fits_beside(next, a);
            let b_fits = self.next_item_fits_beside(next, b);
            match (a_fits, b_fits) {
                (true, false) => return Ordering::Less,
                (false, true) => return Ordering::Greater,
                _ => {}
            }
        }

        let a_additional = self.additional_items_packed(a);
        let b_additional = self.additional_items_packed(b);
        if a_additional != b_additional {
            return b_additional.cmp(&a_additional);
        }

        let a_gap = a_left.width.min(a_left.length);
        let b_gap = b_left.width.min(b_left.length);
        a_gap.cmp(&b_gap).then_with(|| b.footprint().cmp(&a.footprint()))
    }

    fn next_item_fits_beside(&self, next: &Arc<Item>, candidate: &OrientatedItem) -> bool {
        let space = self.placement.space;
        let position = self.placement.position;
        let beside = Placement {
            space: Dimensions::new(space.width - candidate.width(), space.length, space.depth),
            position: Position::new(position.x + candidate.width(), position.y, position.z),
            ..self.placement
        };
        !self
            .factory
            .possible_orientations(next, Some(candidate), beside)
            .is_empty()
    }

    /// Estimates how many of the next queued items still fit after choosing
    /// `candidate`, by packing the rest of the row and the rest of the layer
    /// as two working volumes.
    fn additional_items_packed(&self, candidate: &OrientatedItem) -> usize {
        if self.factory.single_pass || self.next_items.is_empty() {
            return 0;
        }

        let ctx = self.factory.ctx;
        let space = self.placement.space;
        // A stack envelope can be shorter than the row it sits in.
        let row_length = self.placement.row_length.max(candidate.length()).min(space.length);
        let lookahead = self.next_items.top_n(ctx.config.lookahead_item_limit);

        let key = LookaheadKey {
            candidate: candidate.dimensions(),
            envelope: space,
            row_length,
            items: lookahead
                .iter()
                .map(|i| (i.dimensions(), i.weight(), i.rotation()))
                .collect(),
        };

        ctx.caches.lookahead(key, || {
            let quiet = ctx.quiet();
            let mut items = lookahead.clone();

            let rest_of_row = Dimensions::new(space.width.saturating_sub(candidate.width()), row_length, space.depth);
            let rest_of_layer = Dimensions::new(space.width, space.length.saturating_sub(row_length), space.depth);

            for volume in [rest_of_row, rest_of_layer] {
                if items.is_empty() || volume.width == 0 || volume.length == 0 {
                    continue;
                }
                let container = Arc::new(BoxType::working_volume(volume));
                let packer = VolumePacker::new(container, items.clone(), quiet).single_pass(true);
                if let Ok(packed) = packer.pack() {
                    items.remove_items(packed.items().source_items());
                }
            }

            lookahead.len() - items.len()
        })
    }
}

fn remaining(space: Dimensions, orientation: &OrientatedItem) -> Dimensions {
    Dimensions::new(
        space.width - orientation.width(),
        space.length - orientation.length(),
        space.depth - orientation.depth(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::PackingCaches;
    use crate::model::{PlacementConstraint, Rotation};
    use crate::packer::PackingConfig;
    use test_case::test_case;

    fn item(dims: (u32, u32, u32), rotation: Rotation) -> Arc<Item> {
        Arc::new(Item::new("Item", dims, 1, rotation).unwrap())
    }

    fn container(inner: (u32, u32, u32)) -> BoxType {
        BoxType::new("Box", inner, 0, inner, 10_000).unwrap()
    }

    fn placement(space: (u32, u32, u32), packed: &PackedItemList) -> Placement<'_> {
        Placement {
            space: space.into(),
            position: Position::origin(),
            row_length: 0,
            packed,
        }
    }

    #[test_case(Rotation::Never, 1; "never")]
    #[test_case(Rotation::KeepFlat, 2; "keep flat")]
    #[test_case(Rotation::BestFit, 6; "best fit")]
    fn enumerates_by_rotation_policy(rotation: Rotation, expected: usize) {
        let config = PackingConfig::default();
        let caches = PackingCaches::new();
        let ctx = PackingContext::new(&config, &caches);
        let container = container((100, 100, 100));
        let factory = OrientationFactory::new(&container, ctx, false);
        let packed = PackedItemList::new();

        let possible = factory.possible_orientations(&item((10, 20, 30), rotation), None, placement((100, 100, 100), &packed));
        assert_eq!(possible.len(), expected);
        for o in &possible {
            assert!(o.item().allows_orientation(o.dimensions()));
        }
    }

    #[test]
    fn filters_orientations_that_exceed_the_envelope() {
        let config = PackingConfig::default();
        let caches = PackingCaches::new();
        let ctx = PackingContext::new(&config, &caches);
        let container = container((100, 100, 100));
        let factory = OrientationFactory::new(&container, ctx, false);
        let packed = PackedItemList::new();

        let possible = factory.possible_orientations(&item((10, 20, 30), Rotation::BestFit), None, placement((20, 30, 10), &packed));
        let dims: Vec<_> = possible.iter().map(|o| o.dimensions()).collect();
        assert_eq!(dims, [Dimensions::new(20, 30, 10)]);
    }

    #[test]
    fn reuses_previous_orientation_for_identical_items() {
        let config = PackingConfig::default();
        let caches = PackingCaches::new();
        let ctx = PackingContext::new(&config, &caches);
        let container = container((100, 100, 100));
        let factory = OrientationFactory::new(&container, ctx, false);
        let packed = PackedItemList::new();

        let first = item((10, 20, 30), Rotation::BestFit);
        let prev = OrientatedItem::new(Arc::clone(&first), Dimensions::new(30, 10, 20));
        let second = item((20, 30, 10), Rotation::BestFit);

        let possible = factory.possible_orientations(&second, Some(&prev), placement((100, 100, 100), &packed));
        assert_eq!(possible.len(), 1);
        assert_eq!(possible[0].dimensions(), Dimensions::new(30, 10, 20));
    }

    #[test]
    fn does_not_reuse_orientation_the_policy_forbids() {
        let config = PackingConfig::default();
        let caches = PackingCaches::new();
        let ctx = PackingContext::new(&config, &caches);
        let container = container((100, 100, 100));
        let factory = OrientationFactory::new(&container, ctx, false);
        let packed = PackedItemList::new();

        let rotated = OrientatedItem::new(item((10, 20, 30), Rotation::BestFit), Dimensions::new(30, 10, 20));
        let fixed = item((10, 20, 30), Rotation::Never);

        let possible = factory.possible_orientations(&fixed, Some(&rotated), placement((100, 100, 100), &packed));
        let dims: Vec<_> = possible.iter().map(|o| o.dimensions()).collect();
        assert_eq!(dims, [Dimensions::new(10, 20, 30)]);
    }

    #[test]
    fn swapped_frame_keeps_fixed_items_aligned_with_the_real_box() {
        let config = PackingConfig::default();
        let caches = PackingCaches::new();
        let ctx = PackingContext::new(&config, &caches);
        let turned = container((100, 100, 100)).with_swapped_footprint();
        let factory = OrientationFactory::new(&turned, ctx, false).with_swapped_frame(true);
        let packed = PackedItemList::new();

        let possible = factory.possible_orientations(&item((10, 20, 30), Rotation::Never), None, placement((100, 100, 100), &packed));
        let dims: Vec<_> = possible.iter().map(|o| o.dimensions()).collect();
        assert_eq!(dims, [Dimensions::new(20, 10, 30)]);
    }

    #[test]
    fn prefers_stable_orientations() {
        let config = PackingConfig::default();
        let caches = PackingCaches::new();
        let ctx = PackingContext::new(&config, &caches);
        let container = container((100, 100, 100));
        let factory = OrientationFactory::new(&container, ctx, false);
        let packed = PackedItemList::new();
        let pole = item((5, 5, 80), Rotation::BestFit);

        let possible = factory.possible_orientations(&pole, None, placement((100, 100, 100), &packed));
        let usable = factory.usable_orientations(&pole, possible);
        assert!(!usable.is_empty());
        assert!(usable.iter().all(|o| o.depth() == 5), "only lying orientations are stable");
    }

    #[test]
    fn full_depth_counts_as_stable() {
        let config = PackingConfig::default();
        let caches = PackingCaches::new();
        let ctx = PackingContext::new(&config, &caches);
        let container = container((5, 5, 80));
        let factory = OrientationFactory::new(&container, ctx, false);
        let packed = PackedItemList::new();
        let pole = item((5, 5, 80), Rotation::Never);

        let possible = factory.possible_orientations(&pole, None, placement((5, 5, 80), &packed));
        assert!(!possible[0].is_stable(), "tip angle alone says unstable");
        let usable = factory.usable_orientations(&pole, possible);
        assert_eq!(usable.len(), 1);
    }

    #[test]
    fn unstable_fallback_only_when_never_stable_in_this_box() {
        let config = PackingConfig::default();
        let caches = PackingCaches::new();
        let ctx = PackingContext::new(&config, &caches);
        let container = container((100, 100, 100));
        let factory = OrientationFactory::new(&container, ctx, false);
        let packed = PackedItemList::new();

        // Standing up is the only option and the policy forbids lying down.
        let upright = item((5, 5, 80), Rotation::Never);
        let possible = factory.possible_orientations(&upright, None, placement((100, 100, 100), &packed));
        assert_eq!(factory.usable_orientations(&upright, possible).len(), 1);

        // The envelope only admits the upright pose, but the item could lie flat in an empty box.
        let flexible = item((5, 5, 80), Rotation::BestFit);
        let possible = factory.possible_orientations(&flexible, None, placement((5, 5, 100), &packed));
        assert!(!possible.is_empty());
        assert!(factory.usable_orientations(&flexible, possible).is_empty());
    }

    #[derive(Debug)]
    struct NotAtOrigin;

    impl PlacementConstraint for NotAtOrigin {
        fn can_be_packed_at(
            &self,
            _item: &Item,
            _container: &BoxType,
            _packed: &PackedItemList,
            position: Position,
            _dims: Dimensions,
        ) -> bool {
            position != Position::origin()
        }
    }

    #[test]
    fn placement_rule_filters_candidates_except_in_working_volumes() {
        let config = PackingConfig::default();
        let caches = PackingCaches::new();
        let ctx = PackingContext::new(&config, &caches);
        let packed = PackedItemList::new();
        let picky = Arc::new(Item::new("Picky", (10, 10, 10), 1, Rotation::BestFit).unwrap().with_constraint(NotAtOrigin));

        let real = container((100, 100, 100));
        let factory = OrientationFactory::new(&real, ctx, false);
        assert!(factory.possible_orientations(&picky, None, placement((100, 100, 100), &packed)).is_empty());

        let working = BoxType::working_volume(Dimensions::new(100, 100, 100));
        let factory = OrientationFactory::new(&working, ctx, false);
        assert_eq!(factory.possible_orientations(&picky, None, placement((100, 100, 100), &packed)).len(), 1);
    }

    #[test]
    fn exact_width_fit_wins() {
        let config = PackingConfig::default();
        let caches = PackingCaches::new();
        let ctx = PackingContext::new(&config, &caches);
        let container = container((100, 100, 100));
        let factory = OrientationFactory::new(&container, ctx, true);
        let packed = PackedItemList::new();
        let plank = item((30, 50, 20), Rotation::KeepFlat);

        let best = factory
            .best_orientation(&plank, None, &ItemList::new(), placement((50, 100, 100), &packed))
            .unwrap();
        assert_eq!(best.dimensions(), Dimensions::new(50, 30, 20));
    }

    #[test]
    fn tie_break_prefers_smaller_gap_then_larger_footprint() {
        let config = PackingConfig::default();
        let caches = PackingCaches::new();
        let ctx = PackingContext::new(&config, &caches);
        let container = container((100, 100, 100));
        let factory = OrientationFactory::new(&container, ctx, true);
        let packed = PackedItemList::new();
        let sorter = OrientationSorter {
            factory: &factory,
            placement: placement((100, 100, 100), &packed),
            next_items: &ItemList::new(),
        };
        let cuboid = item((10, 20, 30), Rotation::BestFit);

        let narrow = OrientatedItem::new(Arc::clone(&cuboid), Dimensions::new(10, 20, 30));
        let wide = OrientatedItem::new(Arc::clone(&cuboid), Dimensions::new(30, 20, 10));
        let long = OrientatedItem::new(Arc::clone(&cuboid), Dimensions::new(20, 30, 10));

        assert_eq!(sorter.compare(&wide, &narrow), Ordering::Less, "gap 70 beats gap 80");
        assert_eq!(sorter.compare(&wide, &long), Ordering::Equal, "same gap and footprint");
        let flat = OrientatedItem::new(cuboid, Dimensions::new(30, 10, 20));
        assert_eq!(sorter.compare(&wide, &flat), Ordering::Less, "larger footprint wins the gap tie");
    }

    #[test]
    fn prefers_orientation_that_leaves_room_for_the_next_item() {
        let config = PackingConfig::default();
        let caches = PackingCaches::new();
        let ctx = PackingContext::new(&config, &caches);
        let container = container((100, 100, 100));
        let factory = OrientationFactory::new(&container, ctx, true);
        let packed = PackedItemList::new();
        let next = ItemList::from_ordered(vec![item((15, 15, 15), Rotation::Never)]);
        let sorter = OrientationSorter {
            factory: &factory,
            placement: placement((30, 100, 100), &packed),
            next_items: &next,
        };
        let cuboid = item((10, 20, 40), Rotation::BestFit);

        let leaves_ten = OrientatedItem::new(Arc::clone(&cuboid), Dimensions::new(20, 40, 10));
        let leaves_twenty = OrientatedItem::new(cuboid, Dimensions::new(10, 40, 20));
        assert_eq!(sorter.compare(&leaves_twenty, &leaves_ten), Ordering::Less);
    }

    #[test]
    fn lookahead_results_are_memoized() {
        let config = PackingConfig::default();
        let caches = PackingCaches::new();
        let ctx = PackingContext::new(&config, &caches);
        let container = container((100, 100, 100));
        let factory = OrientationFactory::new(&container, ctx, false);
        let packed = PackedItemList::new();
        let next = ItemList::from_ordered((0..3).map(|_| item((10, 10, 10), Rotation::BestFit)));
        let sorter = OrientationSorter {
            factory: &factory,
            placement: placement((100, 100, 100), &packed),
            next_items: &next,
        };
        let candidate = OrientatedItem::new(item((50, 50, 50), Rotation::Never), Dimensions::new(50, 50, 50));

        assert_eq!(sorter.additional_items_packed(&candidate), 3);
        assert_eq!(caches.lookahead_entries(), 1);
        assert_eq!(sorter.additional_items_packed(&candidate), 3);
        assert_eq!(caches.lookahead_entries(), 1);
    }

    #[test]
    fn lookahead_in_a_stack_envelope_shorter_than_the_row() {
        let config = PackingConfig::default();
        let caches = PackingCaches::new();
        let ctx = PackingContext::new(&config, &caches);
        let container = container((20, 20, 10));
        let factory = OrientationFactory::new(&container, ctx, false);
        let packed = PackedItemList::new();
        let next = ItemList::from_ordered(vec![item((1, 1, 1), Rotation::Never)]);
        let sorter = OrientationSorter {
            factory: &factory,
            placement: Placement {
                row_length: 20,
                ..placement((10, 10, 5), &packed)
            },
            next_items: &next,
        };
        let candidate = OrientatedItem::new(item((4, 3, 5), Rotation::BestFit), Dimensions::new(4, 3, 5));

        assert_eq!(sorter.additional_items_packed(&candidate), 1);
    }
}
