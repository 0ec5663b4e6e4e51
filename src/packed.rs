//! Placement records produced by the engine.
//!
//! - `OrientatedItem`: one candidate rotation of an item
//! - `PackedItem`: an accepted orientation at a concrete position
//! - `PackedItemList`: the items of one box in placement order
//! - `PackedLayer`: a horizontal slice of a box sharing a z-range
//! - `PackedBox` / `PackedBoxList`: the final solution

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::geometry::{self, LayoutViolation};
use crate::model::{BoxType, Item};
use crate::sorting::{DefaultPackedBoxSorter, PackedBoxSorter};
use crate::types::{Dimensional, Dimensions, Position, Positioned, Weighted};

/// One candidate rotation of an item.
#[derive(Clone, Debug)]
pub struct OrientatedItem {
    item: Arc<Item>,
    dims: Dimensions,
}

impl OrientatedItem {
    pub fn new(item: Arc<Item>, dims: Dimensions) -> Self {
        Self { item, dims }
    }

    pub fn item(&self) -> &Arc<Item> {
        &self.item
    }

    pub fn width(&self) -> u32 {
        self.dims.width
    }

    pub fn length(&self) -> u32 {
        self.dims.length
    }

    pub fn depth(&self) -> u32 {
        self.dims.depth
    }

    pub fn tip_angle(&self) -> f64 {
        self.dims.tip_angle()
    }

    pub fn is_stable(&self) -> bool {
        self.dims.is_stable()
    }

    /// Checks whether `item` has the same dimensions in some order.
    pub fn is_same_shape_as(&self, item: &Item) -> bool {
        self.dims.is_same_shape(&item.dimensions())
    }
}

impl Dimensional for OrientatedItem {
    fn dimensions(&self) -> Dimensions {
        self.dims
    }
}

impl fmt::Display for OrientatedItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} as {}", self.item.description(), self.dims)
    }
}

/// An item placed at a position inside a box.
#[derive(Clone, Debug)]
pub struct PackedItem {
    item: Arc<Item>,
    position: Position,
    dims: Dimensions,
}

impl PackedItem {
    pub fn new(item: Arc<Item>, position: Position, dims: Dimensions) -> Self {
        Self {
            item,
            position,
            dims,
        }
    }

    pub fn from_orientated(orientated: OrientatedItem, position: Position) -> Self {
        Self::new(orientated.item, position, orientated.dims)
    }

    pub fn item(&self) -> &Arc<Item> {
        &self.item
    }

    pub fn x(&self) -> u32 {
        self.position.x
    }

    pub fn y(&self) -> u32 {
        self.position.y
    }

    pub fn z(&self) -> u32 {
        self.position.z
    }

    pub fn width(&self) -> u32 {
        self.dims.width
    }

    pub fn length(&self) -> u32 {
        self.dims.length
    }

    pub fn depth(&self) -> u32 {
        self.dims.depth
    }

    /// The z coordinate of the item's upper face.
    pub fn top(&self) -> u32 {
        self.position.z + self.dims.depth
    }

    pub fn to_orientated(&self) -> OrientatedItem {
        OrientatedItem::new(Arc::clone(&self.item), self.dims)
    }

    /// Same item moved to a new height.
    pub(crate) fn with_z(&self, z: u32) -> Self {
        Self {
            position: Position::new(self.position.x, self.position.y, z),
            ..self.clone()
        }
    }

    /// Mirrors the placement across the x = y diagonal.
    pub(crate) fn with_swapped_axes(&self) -> Self {
        Self {
            item: Arc::clone(&self.item),
            position: Position::new(self.position.y, self.position.x, self.position.z),
            dims: self.dims.swapped_footprint(),
        }
    }
}

impl Dimensional for PackedItem {
    fn dimensions(&self) -> Dimensions {
        self.dims
    }
}

impl Positioned for PackedItem {
    fn position(&self) -> Position {
        self.position
    }
}

impl Weighted for PackedItem {
    fn weight(&self) -> u32 {
        self.item.weight()
    }
}

/// Items placed in one box, in placement order.
#[derive(Clone, Debug, Default)]
pub struct PackedItemList {
    items: Vec<PackedItem>,
}

impl PackedItemList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, item: PackedItem) {
        self.items.push(item);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PackedItem> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn as_slice(&self) -> &[PackedItem] {
        &self.items
    }

    /// Sum of item weights.
    pub fn weight(&self) -> u64 {
        crate::types::total_weight(&self.items)
    }

    /// Sum of item volumes.
    pub fn volume(&self) -> u64 {
        self.items.iter().map(|p| p.volume()).sum()
    }

    /// The underlying item instances.
    pub fn source_items(&self) -> impl Iterator<Item = &Arc<Item>> {
        self.items.iter().map(|p| p.item())
    }
}

impl FromIterator<PackedItem> for PackedItemList {
    fn from_iter<I: IntoIterator<Item = PackedItem>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for PackedItemList {
    type Item = PackedItem;
    type IntoIter = std::vec::IntoIter<PackedItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a PackedItemList {
    type Item = &'a PackedItem;
    type IntoIter = std::slice::Iter<'a, PackedItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// A horizontal slice of a box.
///
/// Bounds grow as items are inserted; an empty layer reports zero extent.
#[derive(Clone, Debug, Default)]
pub struct PackedLayer {
    items: Vec<PackedItem>,
    bounds: Option<(Position, Position)>,
    weight: u64,
}

impl PackedLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, item: PackedItem) {
        let low = item.position();
        let high = Position::new(
            low.x + item.width(),
            low.y + item.length(),
            low.z + item.depth(),
        );
        self.bounds = Some(match self.bounds {
            None => (low, high),
            Some((min, max)) => (
                Position::new(min.x.min(low.x), min.y.min(low.y), min.z.min(low.z)),
                Position::new(max.x.max(high.x), max.y.max(high.y), max.z.max(high.z)),
            ),
        });
        self.weight += u64::from(item.weight());
        self.items.push(item);
    }

    pub fn items(&self) -> &[PackedItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn start_depth(&self) -> u32 {
        self.bounds.map_or(0, |(min, _)| min.z)
    }

    pub fn end_depth(&self) -> u32 {
        self.bounds.map_or(0, |(_, max)| max.z)
    }

    pub fn depth(&self) -> u32 {
        self.bounds.map_or(0, |(min, max)| max.z - min.z)
    }

    pub fn width(&self) -> u32 {
        self.bounds.map_or(0, |(min, max)| max.x - min.x)
    }

    pub fn length(&self) -> u32 {
        self.bounds.map_or(0, |(min, max)| max.y - min.y)
    }

    /// Area of the layer's bounding rectangle.
    pub fn footprint(&self) -> u64 {
        u64::from(self.width()) * u64::from(self.length())
    }

    pub fn weight(&self) -> u64 {
        self.weight
    }

    pub(crate) fn into_items(self) -> Vec<PackedItem> {
        self.items
    }
}

/// One fully packed container.
#[derive(Clone, Debug)]
pub struct PackedBox {
    container: Arc<BoxType>,
    items: PackedItemList,
}

impl PackedBox {
    pub fn new(container: Arc<BoxType>, items: PackedItemList) -> Self {
        Self { container, items }
    }

    pub fn container(&self) -> &Arc<BoxType> {
        &self.container
    }

    pub fn items(&self) -> &PackedItemList {
        &self.items
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Gross weight: tare plus contents.
    pub fn weight(&self) -> u64 {
        u64::from(self.container.empty_weight()) + self.items.weight()
    }

    /// Weight of the contents only.
    pub fn item_weight(&self) -> u64 {
        self.items.weight()
    }

    pub fn remaining_weight(&self) -> u64 {
        u64::from(self.container.max_weight()).saturating_sub(self.weight())
    }

    pub fn inner_volume(&self) -> u64 {
        self.container.inner_volume()
    }

    pub fn used_volume(&self) -> u64 {
        self.items.volume()
    }

    pub fn unused_volume(&self) -> u64 {
        self.inner_volume().saturating_sub(self.used_volume())
    }

    /// Used volume as a percentage of inner volume.
    pub fn volume_utilisation(&self) -> f64 {
        let inner = self.inner_volume();
        if inner == 0 {
            return 0.0;
        }
        self.used_volume() as f64 / inner as f64 * 100.0
    }

    pub fn used_width(&self) -> u32 {
        self.items.iter().map(|p| p.x() + p.width()).max().unwrap_or(0)
    }

    pub fn used_length(&self) -> u32 {
        self.items.iter().map(|p| p.y() + p.length()).max().unwrap_or(0)
    }

    pub fn used_depth(&self) -> u32 {
        self.items.iter().map(|p| p.top()).max().unwrap_or(0)
    }

    pub fn remaining_width(&self) -> u32 {
        self.container.inner().width.saturating_sub(self.used_width())
    }

    pub fn remaining_length(&self) -> u32 {
        self.container.inner().length.saturating_sub(self.used_length())
    }

    pub fn remaining_depth(&self) -> u32 {
        self.container.inner().depth.saturating_sub(self.used_depth())
    }

    /// Verifies that every item lies inside the box, no two items overlap and
    /// the weight limit holds.
    pub fn validate_layout(&self) -> Result<(), LayoutViolation> {
        if self.item_weight() > u64::from(self.container.weight_capacity()) {
            return Err(LayoutViolation::Overweight {
                weight: self.item_weight(),
                capacity: u64::from(self.container.weight_capacity()),
            });
        }
        geometry::validate_placements(self.items.as_slice(), self.container.inner())
    }
}

/// The full solution: packed boxes kept in comparator order.
#[derive(Clone)]
pub struct PackedBoxList {
    boxes: Vec<PackedBox>,
    sorter: Arc<dyn PackedBoxSorter>,
}

impl PackedBoxList {
    pub fn new(sorter: Arc<dyn PackedBoxSorter>) -> Self {
        Self {
            boxes: Vec::new(),
            sorter,
        }
    }

    /// Inserts behind every box that compares less than or equal.
    pub fn insert(&mut self, packed_box: PackedBox) {
        let index = self
            .boxes
            .partition_point(|b| self.sorter.compare(b, &packed_box) != Ordering::Greater);
        self.boxes.insert(index, packed_box);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PackedBox> {
        self.boxes.iter()
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    pub fn first(&self) -> Option<&PackedBox> {
        self.boxes.first()
    }

    pub fn as_slice(&self) -> &[PackedBox] {
        &self.boxes
    }

    pub fn into_vec(self) -> Vec<PackedBox> {
        self.boxes
    }

    pub(crate) fn sorter(&self) -> &Arc<dyn PackedBoxSorter> {
        &self.sorter
    }

    pub fn item_count(&self) -> usize {
        self.boxes.iter().map(PackedBox::item_count).sum()
    }

    /// Gross weight of all boxes.
    pub fn total_weight(&self) -> u64 {
        self.boxes.iter().map(PackedBox::weight).sum()
    }

    /// Mean gross weight per box.
    pub fn mean_weight(&self) -> f64 {
        if self.boxes.is_empty() {
            return 0.0;
        }
        self.total_weight() as f64 / self.boxes.len() as f64
    }

    /// Mean content weight per box, excluding tare.
    pub fn mean_item_weight(&self) -> f64 {
        if self.boxes.is_empty() {
            return 0.0;
        }
        let items: u64 = self.boxes.iter().map(PackedBox::item_weight).sum();
        items as f64 / self.boxes.len() as f64
    }

    /// Population variance of gross box weights.
    pub fn weight_variance(&self) -> f64 {
        if self.boxes.is_empty() {
            return 0.0;
        }
        let mean = self.mean_weight();
        let sum: f64 = self
            .boxes
            .iter()
            .map(|b| (b.weight() as f64 - mean).powi(2))
            .sum();
        sum / self.boxes.len() as f64
    }

    /// Used volume over inner volume across all boxes, in percent.
    pub fn volume_utilisation(&self) -> f64 {
        let inner: u64 = self.boxes.iter().map(PackedBox::inner_volume).sum();
        if inner == 0 {
            return 0.0;
        }
        let used: u64 = self.boxes.iter().map(PackedBox::used_volume).sum();
        used as f64 / inner as f64 * 100.0
    }
}

impl Default for PackedBoxList {
    fn default() -> Self {
        Self::new(Arc::new(DefaultPackedBoxSorter))
    }
}

impl fmt::Debug for PackedBoxList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.boxes.iter()).finish()
    }
}

impl<'a> IntoIterator for &'a PackedBoxList {
    type Item = &'a PackedBox;
    type IntoIter = std::slice::Iter<'a, PackedBox>;

    fn into_iter(self) -> Self::IntoIter {
        self.boxes.iter()
    }
}
