//! Common value types and traits for 3D packing geometry.
//!
//! All lengths are integral (millimetres by convention) and all weights are
//! integral (grams by convention). Aggregates such as volumes and summed
//! weights are widened to `u64` so they cannot overflow for realistic loads.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Tip angle (radians) above which an orientation counts as stable.
///
/// Roughly 15°: an item whose shorter footprint side is small compared to its
/// height has a high centre of gravity and tips over easily.
pub const STABLE_TIP_ANGLE: f64 = 0.261;

/// Width, length and depth of an axis-aligned cuboid.
///
/// Width runs along the x axis, length along y and depth (height) along z.
///
/// # Examples
/// ```
/// use boxstack::types::Dimensions;
///
/// let dims = Dimensions::new(10, 20, 5);
/// assert_eq!(dims.volume(), 1_000);
/// assert_eq!(dims.footprint(), 200);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub length: u32,
    pub depth: u32,
}

impl Dimensions {
    #[inline]
    pub const fn new(width: u32, length: u32, depth: u32) -> Self {
        Self {
            width,
            length,
            depth,
        }
    }

    /// Converts to tuple format for API compatibility.
    #[inline]
    pub const fn as_tuple(&self) -> (u32, u32, u32) {
        (self.width, self.length, self.depth)
    }

    #[inline]
    pub fn volume(&self) -> u64 {
        u64::from(self.width) * u64::from(self.length) * u64::from(self.depth)
    }

    /// Base area (width × length).
    #[inline]
    pub fn footprint(&self) -> u64 {
        u64::from(self.width) * u64::from(self.length)
    }

    /// Returns the dimensions sorted ascending, ignoring which axis is which.
    #[inline]
    pub fn sorted(&self) -> [u32; 3] {
        let mut dims = [self.width, self.length, self.depth];
        dims.sort_unstable();
        dims
    }

    /// Checks whether two cuboids are identical up to rotation.
    #[inline]
    pub fn is_same_shape(&self, other: &Self) -> bool {
        self.sorted() == other.sorted()
    }

    /// Checks if these dimensions fit within `space` without rotating.
    #[inline]
    pub fn fits_within(&self, space: &Self) -> bool {
        self.width <= space.width && self.length <= space.length && self.depth <= space.depth
    }

    /// Same cuboid with width and length exchanged.
    #[inline]
    pub const fn swapped_footprint(&self) -> Self {
        Self::new(self.length, self.width, self.depth)
    }

    /// Angle (radians) the cuboid can lean before it tips over.
    ///
    /// A depth of zero is treated as one.
    pub fn tip_angle(&self) -> f64 {
        let base = f64::from(self.width.min(self.length));
        let height = f64::from(self.depth.max(1));
        (base / height).atan()
    }

    /// Low centre of gravity relative to the footprint.
    #[inline]
    pub fn is_stable(&self) -> bool {
        self.tip_angle() > STABLE_TIP_ANGLE
    }

    /// Checks if all components are non-zero.
    #[inline]
    pub fn is_valid_dimension(&self) -> bool {
        self.width > 0 && self.length > 0 && self.depth > 0
    }
}

impl From<(u32, u32, u32)> for Dimensions {
    #[inline]
    fn from(tuple: (u32, u32, u32)) -> Self {
        Self::new(tuple.0, tuple.1, tuple.2)
    }
}

impl From<Dimensions> for (u32, u32, u32) {
    #[inline]
    fn from(dims: Dimensions) -> Self {
        dims.as_tuple()
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}×{}×{}", self.width, self.length, self.depth)
    }
}

/// Lower-left-bottom corner of a placed cuboid inside a box.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl Position {
    #[inline]
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    /// The origin of a box.
    #[inline]
    pub const fn origin() -> Self {
        Self::new(0, 0, 0)
    }
}

/// Trait for objects with 3D dimensions.
pub trait Dimensional {
    /// Returns the dimensions of the object.
    fn dimensions(&self) -> Dimensions;

    fn volume(&self) -> u64 {
        self.dimensions().volume()
    }

    fn footprint(&self) -> u64 {
        self.dimensions().footprint()
    }
}

/// Trait for objects with a position in 3D space.
pub trait Positioned {
    /// Returns the position (lower left bottom corner).
    fn position(&self) -> Position;
}

/// Trait for objects with weight.
pub trait Weighted {
    fn weight(&self) -> u32;
}

/// Sums weights into a `u64` so large item counts cannot overflow.
pub fn total_weight<'a, W: Weighted + 'a>(items: impl IntoIterator<Item = &'a W>) -> u64 {
    items.into_iter().map(|w| u64::from(w.weight())).sum()
}

/// Validation functions shared by the model constructors.
pub mod validation {
    use super::Dimensions;

    /// Validates all three dimensions of a 3D object.
    ///
    /// # Parameters
    /// * `dims` - The dimensions to validate
    /// * `subject` - Prefix used in the error text (e.g. "Inner")
    ///
    /// # Returns
    /// `Ok(())` for valid values, otherwise error text
    pub fn validate_dimensions(dims: Dimensions, subject: &str) -> Result<(), String> {
        for (name, value) in [
            ("width", dims.width),
            ("length", dims.length),
            ("depth", dims.depth),
        ] {
            if value == 0 {
                return Err(format!("{subject} {name} must be positive, got: {value}"));
            }
        }
        Ok(())
    }

    /// Validates that an inner envelope fits inside its outer shell.
    pub fn validate_nested(inner: Dimensions, outer: Dimensions) -> Result<(), String> {
        if !inner.fits_within(&outer) {
            return Err(format!(
                "Inner dimensions {inner} exceed outer dimensions {outer}"
            ));
        }
        Ok(())
    }
}
