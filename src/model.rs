//! Input data model for the packing engine.
//!
//! This module defines the caller-supplied, read-only descriptors:
//! - `Item`: a thing to pack with dimensions, weight and a rotation policy
//! - `BoxType`: a container type with outer/inner dimensions and weight limits
//! - `PlacementConstraint`: optional per-item hook for custom placement rules

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::packed::PackedItemList;
use crate::types::{Dimensional, Dimensions, Position, Weighted, validation};

/// Validation error for caller-supplied descriptors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid dimension: {0}")]
    InvalidDimension(String),
    #[error("Invalid weight: {0}")]
    InvalidWeight(String),
}

/// Which rotations an item tolerates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rotation {
    /// Packed exactly as specified.
    Never,
    /// May be turned around its vertical axis only (width and length swap).
    KeepFlat,
    /// Any of the six axis-aligned orientations.
    #[default]
    BestFit,
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rotation::Never => write!(f, "never"),
            Rotation::KeepFlat => write!(f, "keep_flat"),
            Rotation::BestFit => write!(f, "best_fit"),
        }
    }
}

/// Custom placement rules attached to an item.
///
/// Both checks default to "allowed". The engine calls
/// [`can_be_packed_in_box`](Self::can_be_packed_in_box) before trying any
/// orientation of the item in a box, and [`can_be_packed_at`](Self::can_be_packed_at)
/// for every candidate orientation at a concrete position. Neither is consulted
/// inside lookahead simulations.
pub trait PlacementConstraint: Send + Sync + fmt::Debug {
    fn can_be_packed_in_box(
        &self,
        _item: &Item,
        _packed: &PackedItemList,
        _container: &BoxType,
    ) -> bool {
        true
    }

    fn can_be_packed_at(
        &self,
        _item: &Item,
        _container: &BoxType,
        _packed: &PackedItemList,
        _position: Position,
        _dims: Dimensions,
    ) -> bool {
        true
    }

    /// Whether decisions depend on coordinates.
    ///
    /// Layer stabilisation moves items along z after they were validated, so it
    /// is disabled for any pack containing a position-dependent constraint.
    fn is_position_dependent(&self) -> bool {
        true
    }
}

/// Caps how many items sharing a description may go into one box.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MaxPerBox {
    limit: usize,
}

impl MaxPerBox {
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl PlacementConstraint for MaxPerBox {
    fn can_be_packed_in_box(&self, item: &Item, packed: &PackedItemList, _container: &BoxType) -> bool {
        let already = packed
            .iter()
            .filter(|p| p.item().description() == item.description())
            .count();
        already < self.limit
    }

    fn is_position_dependent(&self) -> bool {
        false
    }
}

/// A thing to pack.
///
/// Items are immutable. The packer wraps every instance in an `Arc`, so two
/// items with identical data remain distinct instances.
#[derive(Clone, Debug)]
pub struct Item {
    description: String,
    dims: Dimensions,
    weight: u32,
    rotation: Rotation,
    constraint: Option<Arc<dyn PlacementConstraint>>,
}

impl Item {
    /// Creates a new item with validation.
    ///
    /// Width and length must be positive; a depth of zero is accepted for
    /// sheet-like goods.
    ///
    /// # Examples
    /// ```
    /// use boxstack::{Item, Rotation};
    ///
    /// let ok = Item::new("Book", (200, 150, 30), 450, Rotation::KeepFlat);
    /// assert!(ok.is_ok());
    ///
    /// let invalid = Item::new("Nothing", (0, 150, 30), 450, Rotation::BestFit);
    /// assert!(invalid.is_err());
    /// ```
    pub fn new(
        description: impl Into<String>,
        dims: impl Into<Dimensions>,
        weight: u32,
        rotation: Rotation,
    ) -> Result<Self, ValidationError> {
        let dims = dims.into();
        if dims.width == 0 || dims.length == 0 {
            return Err(ValidationError::InvalidDimension(format!(
                "Item width and length must be positive, got: {dims}"
            )));
        }
        Ok(Self {
            description: description.into(),
            dims,
            weight,
            rotation,
            constraint: None,
        })
    }

    /// Attaches a custom placement rule.
    pub fn with_constraint(mut self, constraint: impl PlacementConstraint + 'static) -> Self {
        self.constraint = Some(Arc::new(constraint));
        self
    }

    pub fn description(&self) -> &str {
        &self.description
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

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn constraint(&self) -> Option<&dyn PlacementConstraint> {
        self.constraint.as_deref()
    }

    /// True if the item carries a constraint that depends on coordinates.
    pub fn is_position_constrained(&self) -> bool {
        self.constraint
            .as_ref()
            .is_some_and(|c| c.is_position_dependent())
    }

    /// All orientations permitted by the rotation policy, without duplicates.
    ///
    /// Order: as given, footprint swapped, then the four upright-changing
    /// rotations (best fit only).
    pub fn permutations(&self) -> Vec<Dimensions> {
        let Dimensions {
            width: w,
            length: l,
            depth: d,
        } = self.dims;

        let candidates: &[(u32, u32, u32)] = match self.rotation {
            Rotation::Never => &[(w, l, d)],
            Rotation::KeepFlat => &[(w, l, d), (l, w, d)],
            Rotation::BestFit => &[
                (w, l, d),
                (l, w, d),
                (w, d, l),
                (l, d, w),
                (d, w, l),
                (d, l, w),
            ],
        };

        let mut permutations: Vec<Dimensions> = Vec::with_capacity(candidates.len());
        for &candidate in candidates {
            let dims = Dimensions::from(candidate);
            // A sheet stood on its edge has no footprint.
            if dims.width == 0 || dims.length == 0 {
                continue;
            }
            if !permutations.contains(&dims) {
                permutations.push(dims);
            }
        }
        permutations
    }

    /// Checks whether `dims` is a legal orientation of this item.
    pub fn allows_orientation(&self, dims: Dimensions) -> bool {
        match self.rotation {
            Rotation::Never => dims == self.dims,
            Rotation::KeepFlat => dims == self.dims || dims == self.dims.swapped_footprint(),
            Rotation::BestFit => dims.is_same_shape(&self.dims),
        }
    }
}

impl Dimensional for Item {
    fn dimensions(&self) -> Dimensions {
        self.dims
    }
}

impl Weighted for Item {
    fn weight(&self) -> u32 {
        self.weight
    }
}

/// A container type.
///
/// Besides real boxes the engine creates "working volumes": synthetic,
/// weightless boxes standing in for leftover space during lookahead.
#[derive(Clone, Debug)]
pub struct BoxType {
    reference: String,
    outer: Dimensions,
    inner: Dimensions,
    empty_weight: u32,
    max_weight: u32,
    quantity: Option<usize>,
    working_volume: bool,
}

impl BoxType {
    /// Creates a new box type after validating the parameters.
    ///
    /// `max_weight` is the gross limit, i.e. it includes `empty_weight`.
    pub fn new(
        reference: impl Into<String>,
        outer: impl Into<Dimensions>,
        empty_weight: u32,
        inner: impl Into<Dimensions>,
        max_weight: u32,
    ) -> Result<Self, ValidationError> {
        let outer = outer.into();
        let inner = inner.into();
        validation::validate_dimensions(outer, "Outer").map_err(ValidationError::InvalidDimension)?;
        validation::validate_dimensions(inner, "Inner").map_err(ValidationError::InvalidDimension)?;
        validation::validate_nested(inner, outer).map_err(ValidationError::InvalidDimension)?;
        if max_weight < empty_weight {
            return Err(ValidationError::InvalidWeight(format!(
                "Max weight {max_weight} is below empty weight {empty_weight}"
            )));
        }

        Ok(Self {
            reference: reference.into(),
            outer,
            inner,
            empty_weight,
            max_weight,
            quantity: None,
            working_volume: false,
        })
    }

    /// Limits how many boxes of this type may be used (Builder pattern light).
    pub fn with_quantity(mut self, quantity: usize) -> Self {
        self.quantity = Some(quantity);
        self
    }

    /// A weightless, unlimited stand-in for leftover space.
    pub(crate) fn working_volume(inner: Dimensions) -> Self {
        Self {
            reference: format!("working volume {inner}"),
            outer: inner,
            inner,
            empty_weight: 0,
            max_weight: u32::MAX,
            quantity: None,
            working_volume: true,
        }
    }

    /// The same box turned a quarter around its vertical axis.
    pub(crate) fn with_swapped_footprint(&self) -> Self {
        Self {
            outer: self.outer.swapped_footprint(),
            inner: self.inner.swapped_footprint(),
            ..self.clone()
        }
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn outer(&self) -> Dimensions {
        self.outer
    }

    pub fn inner(&self) -> Dimensions {
        self.inner
    }

    pub fn empty_weight(&self) -> u32 {
        self.empty_weight
    }

    pub fn max_weight(&self) -> u32 {
        self.max_weight
    }

    pub fn quantity(&self) -> Option<usize> {
        self.quantity
    }

    pub fn is_working_volume(&self) -> bool {
        self.working_volume
    }

    pub fn inner_volume(&self) -> u64 {
        self.inner.volume()
    }

    /// Net payload the box can carry.
    pub fn weight_capacity(&self) -> u32 {
        self.max_weight - self.empty_weight
    }

    /// Checks the weight limit for a single item (dimensions are checked per orientation).
    pub fn can_carry(&self, item: &Item) -> bool {
        item.weight <= self.weight_capacity()
    }
}

impl fmt::Display for BoxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (inner {})", self.reference, self.inner)
    }
}
