//! Packing orchestration across box types.
//!
//! `Packer` collects boxes and items and runs the rounds: every round packs
//! the remaining queue into each candidate box type, keeps the best result
//! and removes its items from the queue. Small multi-box results are then
//! handed to the weight redistributor.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rayon::prelude::*;

use crate::context::{Deadline, PackingCaches, PackingContext};
use crate::error::{PackingError, Result};
use crate::events::{PackEvent, PackObserver};
use crate::item_list::ItemList;
use crate::model::{BoxType, Item, Rotation};
use crate::packed::{PackedBox, PackedBoxList};
use crate::sorting::{
    BoxSorter, DefaultBoxSorter, DefaultItemSorter, DefaultPackedBoxSorter, ItemSorter, PackedBoxSorter,
};
use crate::types::{Dimensional, Dimensions, Weighted};
use crate::volume_packer::VolumePacker;
use crate::weight_redistributor::WeightRedistributor;

/// Tuning parameters for a pack.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PackingConfig {
    /// Weight redistribution runs for results with at most this many boxes.
    pub max_boxes_to_balance_weight: usize,
    /// How many queued items the orientation lookahead simulates.
    pub lookahead_item_limit: usize,
    /// Wall-clock budget for one pack call.
    pub timeout: Option<Duration>,
    /// Evaluate the candidate boxes of a round on the rayon pool.
    pub parallel_box_evaluation: bool,
}

impl PackingConfig {
    pub const DEFAULT_MAX_BOXES_TO_BALANCE_WEIGHT: usize = 12;
    pub const DEFAULT_LOOKAHEAD_ITEM_LIMIT: usize = 8;

    /// Creates a builder for a custom configuration.
    pub fn builder() -> PackingConfigBuilder {
        PackingConfigBuilder::default()
    }
}

impl Default for PackingConfig {
    fn default() -> Self {
        Self {
            max_boxes_to_balance_weight: Self::DEFAULT_MAX_BOXES_TO_BALANCE_WEIGHT,
            lookahead_item_limit: Self::DEFAULT_LOOKAHEAD_ITEM_LIMIT,
            timeout: None,
            parallel_box_evaluation: false,
        }
    }
}

/// Builder for [`PackingConfig`].
#[derive(Clone, Debug, Default)]
pub struct PackingConfigBuilder {
    config: PackingConfig,
}

impl PackingConfigBuilder {
    pub fn max_boxes_to_balance_weight(mut self, limit: usize) -> Self {
        self.config.max_boxes_to_balance_weight = limit;
        self
    }

    pub fn lookahead_item_limit(mut self, limit: usize) -> Self {
        self.config.lookahead_item_limit = limit;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    pub fn parallel_box_evaluation(mut self, enabled: bool) -> Self {
        self.config.parallel_box_evaluation = enabled;
        self
    }

    pub fn build(self) -> PackingConfig {
        self.config
    }
}

/// Why an item ended up unpacked in infallible mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnpackedReason {
    TooLargeForAnyBox,
    NoBoxesAvailable,
}

impl UnpackedReason {
    pub fn code(&self) -> &'static str {
        match self {
            UnpackedReason::TooLargeForAnyBox => "too_large_for_any_box",
            UnpackedReason::NoBoxesAvailable => "no_boxes_available",
        }
    }
}

impl fmt::Display for UnpackedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnpackedReason::TooLargeForAnyBox => {
                write!(f, "Item does not fit into any box, even on its own")
            }
            UnpackedReason::NoBoxesAvailable => {
                write!(f, "No remaining box could take the item")
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct UnpackedItem {
    pub item: Arc<Item>,
    pub reason: UnpackedReason,
}

/// Result of [`Packer::pack_infallible`].
#[derive(Clone, Debug)]
pub struct PackingOutcome {
    pub packed: PackedBoxList,
    pub unpacked: Vec<UnpackedItem>,
}

impl PackingOutcome {
    /// True if every item was packed.
    pub fn is_complete(&self) -> bool {
        self.unpacked.is_empty()
    }

    pub fn box_count(&self) -> usize {
        self.packed.len()
    }

    pub fn unpacked_count(&self) -> usize {
        self.unpacked.len()
    }
}

/// Remaining stock per box type, indexed like the engine's box list.
#[derive(Clone, Debug)]
pub(crate) struct BoxQuantities {
    remaining: Vec<Option<usize>>,
}

impl BoxQuantities {
    pub fn new(boxes: &[Arc<BoxType>]) -> Self {
        Self {
            remaining: boxes.iter().map(|b| b.quantity()).collect(),
        }
    }

    pub fn is_available(&self, index: usize) -> bool {
        !matches!(self.remaining.get(index), Some(Some(0)) | None)
    }

    pub fn consume(&mut self, index: usize) {
        if let Some(Some(left)) = self.remaining.get_mut(index) {
            *left = left.saturating_sub(1);
        }
    }

    pub fn release(&mut self, index: usize) {
        if let Some(Some(left)) = self.remaining.get_mut(index) {
            *left += 1;
        }
    }
}

/// The round loop, shared by the top-level pack and the weight redistributor.
#[derive(Clone, Copy)]
pub(crate) struct PackingEngine<'a> {
    pub boxes: &'a [Arc<BoxType>],
    pub item_sorter: &'a dyn ItemSorter,
    pub packed_box_sorter: &'a Arc<dyn PackedBoxSorter>,
    pub ctx: PackingContext<'a>,
}

impl<'a> PackingEngine<'a> {
    pub fn index_of(&self, container: &Arc<BoxType>) -> Option<usize> {
        self.boxes.iter().position(|b| Arc::ptr_eq(b, container))
    }

    /// Packs `items` round by round until the queue is empty.
    ///
    /// With `enforce_single_box`, only box types large enough by volume for
    /// the whole queue are tried.
    pub fn do_volume_packing(
        &self,
        mut items: ItemList,
        quantities: &mut BoxQuantities,
        single_pass: bool,
        enforce_single_box: bool,
    ) -> Result<PackedBoxList> {
        let mut packed_boxes = PackedBoxList::new(Arc::clone(self.packed_box_sorter));

        while !items.is_empty() {
            let candidates = self.box_search_order(&items, quantities, enforce_single_box);
            let evaluated = self.evaluate(&candidates, &items, single_pass)?;

            let best = evaluated
                .into_iter()
                .min_by(|(_, a), (_, b)| self.packed_box_sorter.compare(a, b));

            let (index, packed) = match best {
                Some((index, packed)) if packed.item_count() > 0 => (index, packed),
                _ => {
                    log::debug!("no box could take any of {} remaining items", items.len());
                    return Err(PackingError::NoBoxesAvailable {
                        items: items.into_vec(),
                    });
                }
            };

            items.remove_items(packed.items().source_items());
            quantities.consume(index);

            self.ctx.emit(|| PackEvent::BoxSelected {
                index: packed_boxes.len(),
                reference: packed.container().reference().to_string(),
                items: packed.item_count(),
                weight: packed.weight(),
            });
            if self.ctx.is_observed() {
                for placed in packed.items() {
                    self.ctx
                        .emit(|| PackEvent::item_placed(packed.container(), placed));
                }
            }
            log::debug!(
                "round {}: {} takes {} items, {} left",
                packed_boxes.len() + 1,
                packed.container(),
                packed.item_count(),
                items.len()
            );
            packed_boxes.insert(packed);
        }

        Ok(packed_boxes)
    }

    /// Box types whose volume could hold the whole queue come first, then the
    /// rest. Exhausted types are left out.
    fn box_search_order(&self, items: &ItemList, quantities: &BoxQuantities, enforce_single_box: bool) -> Vec<usize> {
        let item_volume = items.volume();
        let mut preferred = Vec::new();
        let mut others = Vec::new();
        for (index, container) in self.boxes.iter().enumerate() {
            if !quantities.is_available(index) {
                continue;
            }
            if container.inner_volume() >= item_volume {
                preferred.push(index);
            } else if !enforce_single_box {
                others.push(index);
            }
        }
        preferred.extend(others);
        preferred
    }

    /// Packs the queue into each candidate, stopping after the first one that
    /// takes everything.
    fn evaluate(&self, candidates: &[usize], items: &ItemList, single_pass: bool) -> Result<Vec<(usize, PackedBox)>> {
        let pack_one = |index: usize| -> Result<PackedBox> {
            self.ctx.check_deadline()?;
            VolumePacker::new(Arc::clone(&self.boxes[index]), items.clone(), self.ctx)
                .single_pass(single_pass)
                .pack()
        };

        let mut results = Vec::with_capacity(candidates.len());
        if self.ctx.config.parallel_box_evaluation && candidates.len() > 1 {
            let evaluated: Vec<Result<PackedBox>> = candidates.par_iter().map(|&index| pack_one(index)).collect();
            for (&index, packed) in candidates.iter().zip(evaluated) {
                let packed = packed?;
                let perfect = packed.item_count() == items.len();
                results.push((index, packed));
                if perfect {
                    break;
                }
            }
        } else {
            for &index in candidates {
                let packed = pack_one(index)?;
                let perfect = packed.item_count() == items.len();
                results.push((index, packed));
                if perfect {
                    break;
                }
            }
        }
        Ok(results)
    }
}

/// Everything the precheck looks at. Items with the same shape pass or fail
/// it together, whatever their description or placement rule.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
struct ItemShape {
    dimensions: Dimensions,
    weight: u32,
    rotation: Rotation,
}

impl ItemShape {
    fn of(item: &Item) -> Self {
        Self {
            dimensions: item.dimensions(),
            weight: item.weight(),
            rotation: item.rotation(),
        }
    }
}

/// Checks weight and dimensions alone: could the item go into an empty box?
fn fits_any_box(boxes: &[Arc<BoxType>], item: &Item) -> bool {
    let permutations = item.permutations();
    boxes.iter().any(|container| {
        let inner = container.inner();
        container.can_carry(item) && permutations.iter().any(|dims| dims.fits_within(&inner))
    })
}

/// Entry point of the engine.
///
/// # Examples
/// ```
/// use boxstack::{BoxType, Item, Packer, Rotation};
///
/// let mut packer = Packer::new();
/// packer.add_box(BoxType::new("Le petite box", (300, 300, 10), 10, (296, 296, 8), 1_000).unwrap());
/// packer.add_item(Item::new("Item 1", (250, 250, 2), 200, Rotation::BestFit).unwrap(), 3);
///
/// let packed = packer.pack().unwrap();
/// assert_eq!(packed.len(), 1);
/// assert_eq!(packed.total_weight(), 610);
/// ```
pub struct Packer {
    boxes: Vec<BoxType>,
    items: Vec<Arc<Item>>,
    config: PackingConfig,
    item_sorter: Arc<dyn ItemSorter>,
    box_sorter: Arc<dyn BoxSorter>,
    packed_box_sorter: Arc<dyn PackedBoxSorter>,
    observer: Option<Arc<dyn PackObserver>>,
}

impl Default for Packer {
    fn default() -> Self {
        Self {
            boxes: Vec::new(),
            items: Vec::new(),
            config: PackingConfig::default(),
            item_sorter: Arc::new(DefaultItemSorter),
            box_sorter: Arc::new(DefaultBoxSorter),
            packed_box_sorter: Arc::new(DefaultPackedBoxSorter),
            observer: None,
        }
    }
}

impl fmt::Debug for Packer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packer")
            .field("boxes", &self.boxes)
            .field("items", &self.items.len())
            .field("config", &self.config)
            .field("observed", &self.observer.is_some())
            .finish()
    }
}

impl Packer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: PackingConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &PackingConfig {
        &self.config
    }

    pub fn add_box(&mut self, container: BoxType) {
        self.boxes.push(container);
    }

    pub fn set_boxes(&mut self, boxes: impl IntoIterator<Item = BoxType>) {
        self.boxes = boxes.into_iter().collect();
    }

    /// Adds `quantity` distinct instances of `item`.
    pub fn add_item(&mut self, item: Item, quantity: usize) {
        self.items
            .extend((0..quantity).map(|_| Arc::new(item.clone())));
    }

    pub fn add_items(&mut self, items: impl IntoIterator<Item = Item>) {
        self.items.extend(items.into_iter().map(Arc::new));
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn set_item_sorter(&mut self, sorter: impl ItemSorter + 'static) {
        self.item_sorter = Arc::new(sorter);
    }

    pub fn set_box_sorter(&mut self, sorter: impl BoxSorter + 'static) {
        self.box_sorter = Arc::new(sorter);
    }

    pub fn set_packed_box_sorter(&mut self, sorter: impl PackedBoxSorter + 'static) {
        self.packed_box_sorter = Arc::new(sorter);
    }

    /// Installs an observer that receives every [`PackEvent`].
    pub fn set_observer(&mut self, observer: impl PackObserver + 'static) {
        self.observer = Some(Arc::new(observer));
    }

    /// Packs all items.
    ///
    /// # Errors
    /// * [`PackingError::ItemTooLarge`] if an item fits no box even alone
    /// * [`PackingError::NoBoxesAvailable`] if a round could place nothing
    /// * [`PackingError::Timeout`] if the configured budget ran out
    pub fn pack(&self) -> Result<PackedBoxList> {
        let boxes = self.sorted_boxes();
        if let Some(item) = self.find_unfit_item(&boxes) {
            log::warn!("{} does not fit any of {} box types", item.description(), boxes.len());
            return Err(PackingError::ItemTooLarge {
                item: Arc::clone(item),
            });
        }

        let caches = PackingCaches::new();
        let deadline = self.config.timeout.map(Deadline::new);
        let packed = self.run(&boxes, self.items.clone(), &caches, deadline.as_ref())?;

        self.notify_finished(packed.len(), 0);
        Ok(packed)
    }

    /// Packs what can be packed and reports the rest instead of failing.
    ///
    /// Items that fit no box are set aside up front; items left over when no
    /// box can take anything more are set aside and the remainder is packed
    /// again. Only a timeout is returned as an error.
    pub fn pack_infallible(&self) -> Result<PackingOutcome> {
        let boxes = self.sorted_boxes();
        let caches = PackingCaches::new();
        let deadline = self.config.timeout.map(Deadline::new);

        let (mut remaining, too_large): (Vec<Arc<Item>>, Vec<Arc<Item>>) = self
            .items
            .iter()
            .cloned()
            .partition(|item| fits_any_box(&boxes, item));

        let mut unpacked: Vec<UnpackedItem> = too_large
            .into_iter()
            .map(|item| {
                log::warn!("{} does not fit any box, leaving it out", item.description());
                UnpackedItem {
                    item,
                    reason: UnpackedReason::TooLargeForAnyBox,
                }
            })
            .collect();

        loop {
            match self.run(&boxes, remaining.clone(), &caches, deadline.as_ref()) {
                Ok(packed) => {
                    self.notify_finished(packed.len(), unpacked.len());
                    return Ok(PackingOutcome { packed, unpacked });
                }
                Err(PackingError::NoBoxesAvailable { items: stalled }) => {
                    log::warn!("{} items could not be placed, repacking without them", stalled.len());
                    remaining.retain(|item| !stalled.iter().any(|s| Arc::ptr_eq(s, item)));
                    unpacked.extend(stalled.into_iter().map(|item| UnpackedItem {
                        item,
                        reason: UnpackedReason::NoBoxesAvailable,
                    }));
                }
                Err(PackingError::ItemTooLarge { item }) => {
                    remaining.retain(|i| !Arc::ptr_eq(i, &item));
                    unpacked.push(UnpackedItem {
                        item,
                        reason: UnpackedReason::TooLargeForAnyBox,
                    });
                }
                Err(err @ PackingError::Timeout { .. }) => return Err(err),
            }
        }
    }

    fn sorted_boxes(&self) -> Vec<Arc<BoxType>> {
        let mut boxes: Vec<Arc<BoxType>> = self.boxes.iter().cloned().map(Arc::new).collect();
        boxes.sort_by(|a, b| self.box_sorter.compare(a, b));
        boxes
    }

    /// The first item that fits no box, checking each item shape once.
    fn find_unfit_item(&self, boxes: &[Arc<BoxType>]) -> Option<&Arc<Item>> {
        let mut checked: HashSet<ItemShape> = HashSet::new();
        self.items
            .iter()
            .find(|item| checked.insert(ItemShape::of(item)) && !fits_any_box(boxes, item))
    }

    fn run(
        &self,
        boxes: &[Arc<BoxType>],
        items: Vec<Arc<Item>>,
        caches: &PackingCaches,
        deadline: Option<&Deadline>,
    ) -> Result<PackedBoxList> {
        let ctx = PackingContext::new(&self.config, caches)
            .with_observer(self.observer.as_deref())
            .with_deadline(deadline);
        let engine = PackingEngine {
            boxes,
            item_sorter: self.item_sorter.as_ref(),
            packed_box_sorter: &self.packed_box_sorter,
            ctx,
        };

        let items = ItemList::sorted(items, self.item_sorter.as_ref());
        log::info!("packing {} items into {} box types", items.len(), boxes.len());

        let mut quantities = BoxQuantities::new(boxes);
        let packed = engine.do_volume_packing(items, &mut quantities, false, false)?;

        let packed = if packed.len() > 1 && packed.len() <= self.config.max_boxes_to_balance_weight {
            WeightRedistributor::new(engine, quantities).redistribute(packed)?
        } else {
            packed
        };

        log::info!(
            "packed {} items into {} boxes ({:.1}% utilised)",
            packed.item_count(),
            packed.len(),
            packed.volume_utilisation()
        );
        Ok(packed)
    }

    fn notify_finished(&self, boxes: usize, unpacked: usize) {
        if let Some(observer) = &self.observer {
            observer.on_event(&PackEvent::Finished { boxes, unpacked });
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::model::MaxPerBox;
    use crate::types::Positioned;
    use test_case::test_case;

    fn sample_boxes() -> Vec<BoxType> {
        vec![
            BoxType::new("Small", (110, 110, 60), 50, (100, 100, 50), 2_000).unwrap(),
            BoxType::new("Medium", (210, 160, 110), 120, (200, 150, 100), 5_000).unwrap(),
            BoxType::new("Large", (310, 310, 210), 300, (300, 300, 200), 20_000).unwrap(),
        ]
    }

    fn sample_packer() -> Packer {
        let mut packer = Packer::new();
        packer.set_boxes(sample_boxes());
        let specs: [(&str, (u32, u32, u32), u32, Rotation, usize); 6] = [
            ("Book", (80, 60, 20), 400, Rotation::KeepFlat, 4),
            ("Mug", (40, 40, 50), 300, Rotation::Never, 3),
            ("Tube", (30, 30, 120), 150, Rotation::BestFit, 2),
            ("Brick", (120, 90, 60), 1_800, Rotation::BestFit, 2),
            ("Cushion", (150, 140, 80), 600, Rotation::BestFit, 1),
            ("Card", (90, 60, 1), 10, Rotation::KeepFlat, 5),
        ];
        for (description, dims, weight, rotation, quantity) in specs {
            packer.add_item(Item::new(description, dims, weight, rotation).unwrap(), quantity);
        }
        packer
    }

    /// Reference, positions and dimensions of every placement, in order.
    fn signature(packed: &PackedBoxList) -> Vec<(String, Vec<(String, (u32, u32, u32), (u32, u32, u32))>)> {
        packed
            .iter()
            .map(|b| {
                let items = b
                    .items()
                    .iter()
                    .map(|p| {
                        let pos = p.position();
                        (p.item().description().to_string(), (pos.x, pos.y, pos.z), p.dimensions().as_tuple())
                    })
                    .collect();
                (b.container().reference().to_string(), items)
            })
            .collect()
    }

    #[test]
    fn three_sheets_share_one_box() {
        let mut packer = Packer::new();
        packer.add_box(BoxType::new("Le petite box", (300, 300, 10), 10, (296, 296, 8), 1_000).unwrap());
        packer.add_item(Item::new("Item 1", (250, 250, 2), 200, Rotation::BestFit).unwrap(), 3);

        let packed = packer.pack().unwrap();
        assert_eq!(packed.len(), 1);
        assert_eq!(packed.item_count(), 3);
        assert_eq!(packed.total_weight(), 610);
    }

    #[test]
    fn redistribution_turns_three_plus_one_into_two_plus_two() {
        let mut packer = Packer::new();
        packer.add_box(BoxType::new("Column", (1, 1, 3), 0, (1, 1, 3), 3).unwrap());
        packer.add_item(Item::new("Cube", (1, 1, 1), 1, Rotation::Never).unwrap(), 4);

        let packed = packer.pack().unwrap();
        let counts: Vec<usize> = packed.iter().map(PackedBox::item_count).collect();
        assert_eq!(counts, [2, 2]);
    }

    #[test]
    fn without_redistribution_the_split_stays_three_plus_one() {
        let mut packer = Packer::with_config(PackingConfig::builder().max_boxes_to_balance_weight(1).build());
        packer.add_box(BoxType::new("Column", (1, 1, 3), 0, (1, 1, 3), 3).unwrap());
        packer.add_item(Item::new("Cube", (1, 1, 1), 1, Rotation::Never).unwrap(), 4);

        let counts: Vec<usize> = packer.pack().unwrap().iter().map(PackedBox::item_count).collect();
        assert_eq!(counts, [3, 1]);
    }

    #[test]
    fn oversized_item_fails_the_precheck() {
        let mut packer = Packer::new();
        packer.add_box(BoxType::new("Box", (10, 10, 10), 0, (10, 10, 10), 100).unwrap());
        packer.add_item(Item::new("Fits", (5, 5, 5), 1, Rotation::BestFit).unwrap(), 2);
        packer.add_item(Item::new("Piano", (20, 5, 5), 1, Rotation::BestFit).unwrap(), 1);

        match packer.pack() {
            Err(PackingError::ItemTooLarge { item }) => assert_eq!(item.description(), "Piano"),
            other => panic!("expected ItemTooLarge, got {other:?}"),
        }
    }

    #[test]
    fn precheck_names_the_first_of_several_items_with_the_same_shape() {
        let mut packer = Packer::new();
        packer.add_box(BoxType::new("Box", (10, 10, 10), 0, (10, 10, 10), 100).unwrap());
        packer.add_item(Item::new("Piano", (20, 5, 5), 1, Rotation::BestFit).unwrap(), 1);
        packer.add_item(Item::new("Organ", (20, 5, 5), 1, Rotation::BestFit).unwrap(), 1);

        match packer.pack() {
            Err(PackingError::ItemTooLarge { item }) => assert_eq!(item.description(), "Piano"),
            other => panic!("expected ItemTooLarge, got {other:?}"),
        }
    }

    #[test]
    fn infallible_mode_reports_oversized_item_and_packs_the_rest() {
        let mut packer = Packer::new();
        packer.add_box(BoxType::new("Box", (10, 10, 10), 0, (10, 10, 10), 100).unwrap());
        packer.add_item(Item::new("Fits", (5, 5, 5), 1, Rotation::BestFit).unwrap(), 2);
        packer.add_item(Item::new("Piano", (20, 5, 5), 1, Rotation::BestFit).unwrap(), 1);

        let outcome = packer.pack_infallible().unwrap();
        assert!(!outcome.is_complete());
        assert_eq!(outcome.packed.item_count(), 2);
        assert_eq!(outcome.unpacked_count(), 1);
        assert_eq!(outcome.unpacked[0].item.description(), "Piano");
        assert_eq!(outcome.unpacked[0].reason.code(), "too_large_for_any_box");
    }

    #[test]
    fn overweight_item_counts_as_too_large() {
        let mut packer = Packer::new();
        packer.add_box(BoxType::new("Box", (10, 10, 10), 5, (10, 10, 10), 100).unwrap());
        packer.add_item(Item::new("Anvil", (5, 5, 5), 96, Rotation::BestFit).unwrap(), 1);

        assert!(matches!(packer.pack(), Err(PackingError::ItemTooLarge { .. })));
    }

    #[test_case(None, 1; "unconstrained")]
    #[test_case(Some(2), 4; "at most two per box")]
    fn max_per_box_spreads_items(limit: Option<usize>, expected_boxes: usize) {
        let mut packer = Packer::new();
        packer.add_box(BoxType::new("Box", (10, 10, 10), 0, (10, 10, 10), 1_000).unwrap());
        let mut cube = Item::new("Cube", (1, 1, 1), 1, Rotation::BestFit).unwrap();
        if let Some(limit) = limit {
            cube = cube.with_constraint(MaxPerBox::new(limit));
        }
        packer.add_item(cube, 8);

        let packed = packer.pack().unwrap();
        assert_eq!(packed.len(), expected_boxes);
        assert_eq!(packed.item_count(), 8);
    }

    #[test]
    fn full_depth_orientation_counts_as_stable() {
        let mut packer = Packer::new();
        packer.add_box(BoxType::new("Slot", (55, 5, 50), 0, (55, 5, 50), 1_000).unwrap());
        packer.add_item(Item::new("Block", (50, 5, 50), 10, Rotation::Never).unwrap(), 1);
        packer.add_item(Item::new("Pole", (5, 5, 50), 1, Rotation::BestFit).unwrap(), 1);

        let packed = packer.pack().unwrap();
        assert_eq!(packed.len(), 1, "the standing pole is supported by the full box height");
        assert_eq!(packed.item_count(), 2);
    }

    #[test]
    fn stacking_on_a_short_base_with_lookahead() {
        let mut packer = Packer::new();
        packer.add_box(BoxType::new("Tray", (20, 20, 10), 0, (20, 20, 10), 1_000).unwrap());
        packer.add_item(Item::new("Panel", (10, 20, 10), 1, Rotation::Never).unwrap(), 1);
        packer.add_item(Item::new("Slab", (10, 10, 5), 1, Rotation::Never).unwrap(), 1);
        packer.add_item(Item::new("Carton", (4, 3, 5), 1, Rotation::BestFit).unwrap(), 1);
        packer.add_item(Item::new("Dice", (1, 1, 1), 1, Rotation::BestFit).unwrap(), 1);

        let packed = packer.pack().unwrap();
        assert_eq!(packed.item_count(), 4);
        for packed_box in &packed {
            assert!(packed_box.validate_layout().is_ok());
        }
    }

    #[test]
    fn limited_supply_stops_with_remaining_items() {
        let mut packer = Packer::new();
        packer.add_box(BoxType::new("Crate", (10, 10, 10), 0, (10, 10, 10), 100).unwrap().with_quantity(2));
        packer.add_item(Item::new("Block", (10, 10, 10), 1, Rotation::Never).unwrap(), 3);

        match packer.pack() {
            Err(PackingError::NoBoxesAvailable { items }) => assert_eq!(items.len(), 1),
            other => panic!("expected NoBoxesAvailable, got {other:?}"),
        }

        let outcome = packer.pack_infallible().unwrap();
        assert_eq!(outcome.box_count(), 2);
        assert_eq!(outcome.unpacked_count(), 1);
        assert_eq!(outcome.unpacked[0].reason, UnpackedReason::NoBoxesAvailable);
    }

    #[test]
    fn exhausted_box_types_are_skipped() {
        let mut packer = Packer::new();
        packer.add_box(BoxType::new("Unavailable", (10, 10, 10), 0, (10, 10, 10), 100).unwrap().with_quantity(0));
        packer.add_box(BoxType::new("Spare", (20, 20, 20), 0, (20, 20, 20), 100).unwrap());
        packer.add_item(Item::new("Block", (10, 10, 10), 1, Rotation::Never).unwrap(), 1);

        let packed = packer.pack().unwrap();
        assert_eq!(packed.first().map(|b| b.container().reference()), Some("Spare"));
    }

    #[test]
    fn sample_pack_accounts_for_every_item_once() {
        let packer = sample_packer();
        let packed = packer.pack().unwrap();

        assert_eq!(packed.item_count(), packer.item_count());
        let mut seen: Vec<*const Item> = packed
            .iter()
            .flat_map(|b| b.items().iter().map(|p| Arc::as_ptr(p.item())))
            .collect();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), packer.item_count(), "no item instance is placed twice");
    }

    #[test]
    fn sample_pack_layouts_are_valid() {
        let packed = sample_packer().pack().unwrap();
        for packed_box in &packed {
            if let Err(violation) = packed_box.validate_layout() {
                panic!("{} is invalid: {violation}", packed_box.container());
            }
        }
    }

    #[test]
    fn sample_pack_orientations_follow_rotation_policy() {
        let packed = sample_packer().pack().unwrap();
        for placed in packed.iter().flat_map(|b| b.items().iter()) {
            assert!(
                placed.item().allows_orientation(placed.dimensions()),
                "{} packed as {}",
                placed.item().description(),
                placed.dimensions()
            );
        }
    }

    #[test]
    fn packing_is_deterministic() {
        let first = signature(&sample_packer().pack().unwrap());
        let second = signature(&sample_packer().pack().unwrap());
        assert_eq!(first, second);
    }

    #[test]
    fn parallel_evaluation_matches_sequential() {
        let sequential = signature(&sample_packer().pack().unwrap());

        let mut parallel = sample_packer();
        parallel.config = PackingConfig::builder().parallel_box_evaluation(true).build();
        assert_eq!(signature(&parallel.pack().unwrap()), sequential);
    }

    #[test]
    fn custom_item_sorter_changes_only_the_order() {
        let mut packer = sample_packer();
        packer.set_item_sorter(|a: &Item, b: &Item| a.weight().cmp(&b.weight()));
        let packed = packer.pack().unwrap();
        assert_eq!(packed.item_count(), packer.item_count());
    }

    #[test]
    fn expired_budget_times_out() {
        let mut packer = sample_packer();
        packer.config = PackingConfig::builder().timeout(Duration::ZERO).build();
        assert!(matches!(packer.pack(), Err(PackingError::Timeout { .. })));
        assert!(matches!(packer.pack_infallible(), Err(PackingError::Timeout { .. })));
    }

    #[test]
    fn observer_sees_selection_placements_and_finish() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);

        let mut packer = Packer::new();
        packer.add_box(BoxType::new("Box", (10, 10, 10), 0, (10, 10, 10), 100).unwrap());
        packer.add_item(Item::new("Cube", (5, 5, 5), 1, Rotation::Never).unwrap(), 2);
        packer.set_observer(move |event: &PackEvent| sink.lock().unwrap().push(event.clone()));
        packer.pack().unwrap();

        let events = events.lock().unwrap();
        let placed = events
            .iter()
            .filter(|e| matches!(e, PackEvent::ItemPlaced { .. }))
            .count();
        assert_eq!(placed, 2);
        assert!(events.iter().any(|e| matches!(e, PackEvent::BoxSelected { items: 2, .. })));
        assert_eq!(events.last(), Some(&PackEvent::Finished { boxes: 1, unpacked: 0 }));
    }

    #[test]
    fn empty_input_packs_to_nothing() {
        let mut packer = Packer::new();
        packer.add_box(BoxType::new("Box", (10, 10, 10), 0, (10, 10, 10), 100).unwrap());
        let packed = packer.pack().unwrap();
        assert!(packed.is_empty());
    }
}
