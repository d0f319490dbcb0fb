//! Data models for container load planning.
//!
//! This module defines the fundamental data structures of the packing core:
//! - `Container`: the load space with its payload limit
//! - `PlanLine`: a line of a load plan (one item type with a quantity)
//! - `Item`: one unit of a line, the engine's input
//! - `Orientation`: one of the six axis assignments of an item
//! - `Placement`: a unit with its chosen orientation, position and loading step

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::BoundingBox;
use crate::types::{Dimensional, Vec3, Weighted};

/// Validation error for container and item data.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Invalid dimension: {0}")]
    InvalidDimension(String),
    #[error("Invalid weight: {0}")]
    InvalidWeight(String),
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("No items to pack")]
    EmptyItemList,
}

fn validate_dimension(value: f64, name: &str) -> Result<(), ValidationError> {
    if value <= 0.0 || value.is_nan() || value.is_infinite() {
        return Err(ValidationError::InvalidDimension(format!(
            "{} must be positive, got: {}",
            name, value
        )));
    }
    Ok(())
}

fn validate_weight_value(value: f64, name: &str) -> Result<(), ValidationError> {
    if value <= 0.0 || value.is_nan() || value.is_infinite() {
        return Err(ValidationError::InvalidWeight(format!(
            "{} must be positive, got: {}",
            name, value
        )));
    }
    Ok(())
}

fn validate_dims(dims: (f64, f64, f64), prefix: &str) -> Result<(), ValidationError> {
    validate_dimension(dims.0, &format!("{prefix} length"))?;
    validate_dimension(dims.1, &format!("{prefix} width"))?;
    validate_dimension(dims.2, &format!("{prefix} height"))?;
    Ok(())
}

/// Represents the inner load space of a container, truck bed or box.
///
/// # Fields
/// * `length`, `width`, `height` - inner dimensions in mm
/// * `max_weight` - maximum payload in kg
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub length: f64,
    pub width: f64,
    pub height: f64,
    pub max_weight: f64,
}

impl Container {
    /// Creates a new container with validation.
    ///
    /// # Examples
    /// ```
    /// use load_it_now::model::Container;
    ///
    /// assert!(Container::new((1000.0, 1000.0, 1000.0), 1000.0).is_ok());
    /// assert!(Container::new((0.0, 1000.0, 1000.0), 1000.0).is_err());
    /// ```
    pub fn new(dims: (f64, f64, f64), max_weight: f64) -> Result<Self, ValidationError> {
        let container = Self {
            length: dims.0,
            width: dims.1,
            height: dims.2,
            max_weight,
        };
        container.validate()?;
        Ok(container)
    }

    /// Re-checks the invariants, e.g. after deserialization.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_dims((self.length, self.width, self.height), "Container")?;
        validate_weight_value(self.max_weight, "Container max weight")
    }

    /// The whole load space as a box anchored at the origin.
    #[inline]
    pub fn bounds(&self) -> BoundingBox {
        BoundingBox::from_position_and_dims(Vec3::zero(), self.dimensions())
    }
}

impl Dimensional for Container {
    fn dimensions(&self) -> Vec3 {
        Vec3::new(self.length, self.width, self.height)
    }
}

/// Rotation of an item: which item dimension lies along which container axis.
///
/// The discriminant is the rotation code reported to callers. Each variant
/// lists the item dimensions mapped to (x, y, z), e.g. `Whl` puts the item
/// width along x, its height along y and its length along z.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Orientation {
    Lwh = 0,
    Wlh = 1,
    Whl = 2,
    Hwl = 3,
    Hlw = 4,
    Lhw = 5,
}

impl Orientation {
    pub const ALL: [Orientation; 6] = [
        Orientation::Lwh,
        Orientation::Wlh,
        Orientation::Whl,
        Orientation::Hwl,
        Orientation::Hlw,
        Orientation::Lhw,
    ];

    /// Rotation code (0..=5).
    #[inline]
    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    /// Extents along (x, y, z) of an item with dimensions (L, W, H).
    pub fn apply(self, dims: Vec3) -> Vec3 {
        let (l, w, h) = (dims.x, dims.y, dims.z);
        match self {
            Orientation::Lwh => Vec3::new(l, w, h),
            Orientation::Wlh => Vec3::new(w, l, h),
            Orientation::Whl => Vec3::new(w, h, l),
            Orientation::Hwl => Vec3::new(h, w, l),
            Orientation::Hlw => Vec3::new(h, l, w),
            Orientation::Lhw => Vec3::new(l, h, w),
        }
    }
}

/// Identity of a unit: its source line and its ordinal (1..=quantity) in it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemRef {
    pub line_id: String,
    pub ordinal: u32,
}

/// A single unit to be packed (quantities already expanded).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub reference: ItemRef,
    pub label: Option<String>,
    pub length: f64,
    pub width: f64,
    pub height: f64,
    pub weight: f64,
    pub allow_rotation: bool,
    /// Maximum number of units of the same line in one vertical stack.
    /// `None` or `Some(0)` means unlimited.
    pub stacking_limit: Option<u32>,
}

impl Item {
    /// Creates a new unit with validation. Rotation is allowed, stacking unlimited.
    pub fn new(
        reference: ItemRef,
        dims: (f64, f64, f64),
        weight: f64,
    ) -> Result<Self, ValidationError> {
        let item = Self {
            reference,
            label: None,
            length: dims.0,
            width: dims.1,
            height: dims.2,
            weight,
            allow_rotation: true,
            stacking_limit: None,
        };
        item.validate()?;
        Ok(item)
    }

    pub fn with_rotation(mut self, allow_rotation: bool) -> Self {
        self.allow_rotation = allow_rotation;
        self
    }

    pub fn with_stacking_limit(mut self, limit: Option<u32>) -> Self {
        self.stacking_limit = limit;
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.reference.line_id.trim().is_empty() {
            return Err(ValidationError::InvalidIdentifier(
                "Item line id must not be empty".to_string(),
            ));
        }
        validate_dims((self.length, self.width, self.height), "Item")?;
        validate_weight_value(self.weight, "Item weight")
    }

    /// Effective stacking limit, `None` when unlimited.
    pub fn effective_stacking_limit(&self) -> Option<u32> {
        self.stacking_limit.filter(|&limit| limit > 0)
    }

    /// Orientations the engine may try, in ascending rotation code.
    ///
    /// Orientations producing identical extents (e.g. for cubes) are listed once,
    /// keeping the lowest code.
    pub fn permitted_orientations(&self) -> Vec<Orientation> {
        if !self.allow_rotation {
            return vec![Orientation::Lwh];
        }

        let dims = self.dimensions();
        let mut seen: Vec<Vec3> = Vec::with_capacity(6);
        let mut permitted = Vec::with_capacity(6);
        for orientation in Orientation::ALL {
            let extents = orientation.apply(dims);
            if !seen.contains(&extents) {
                seen.push(extents);
                permitted.push(orientation);
            }
        }
        permitted
    }
}

impl Dimensional for Item {
    fn dimensions(&self) -> Vec3 {
        Vec3::new(self.length, self.width, self.height)
    }
}

/// A unit placed in the container.
///
/// # Fields
/// * `item` - the placed unit
/// * `orientation` - the chosen rotation
/// * `position` - minimum corner in the container
/// * `extents` - size along (x, y, z) after applying the orientation
/// * `step_number` - 1-based loading sequence number
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub item: Item,
    pub orientation: Orientation,
    pub position: Vec3,
    pub extents: Vec3,
    pub step_number: u32,
}

impl Placement {
    #[inline]
    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::from_position_and_dims(self.position, self.extents)
    }

    #[inline]
    pub fn top_z(&self) -> f64 {
        self.position.z + self.extents.z
    }
}

impl Dimensional for Placement {
    fn dimensions(&self) -> Vec3 {
        self.extents
    }
}

impl Weighted for Placement {
    fn weight(&self) -> f64 {
        self.item.weight
    }
}

/// A line of a load plan: one item type and how many units of it to load.
///
/// Built with a small builder and expanded into units with [`PlanLine::expand`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanLine {
    pub id: String,
    pub label: Option<String>,
    pub length: f64,
    pub width: f64,
    pub height: f64,
    pub weight: f64,
    pub quantity: u32,
    pub allow_rotation: bool,
    pub stacking_limit: Option<u32>,
}

impl PlanLine {
    /// Creates a line with quantity 1, rotation allowed and unlimited stacking.
    pub fn new(id: impl Into<String>, dims: (f64, f64, f64), weight: f64) -> Self {
        Self {
            id: id.into(),
            label: None,
            length: dims.0,
            width: dims.1,
            height: dims.2,
            weight,
            quantity: 1,
            allow_rotation: true,
            stacking_limit: None,
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn quantity(mut self, quantity: u32) -> Self {
        self.quantity = quantity;
        self
    }

    pub fn allow_rotation(mut self, allow_rotation: bool) -> Self {
        self.allow_rotation = allow_rotation;
        self
    }

    pub fn stacking_limit(mut self, limit: u32) -> Self {
        self.stacking_limit = Some(limit);
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.trim().is_empty() {
            return Err(ValidationError::InvalidIdentifier(
                "Line id must not be empty".to_string(),
            ));
        }
        validate_dims((self.length, self.width, self.height), "Item")?;
        validate_weight_value(self.weight, "Item weight")?;
        if self.quantity == 0 {
            return Err(ValidationError::InvalidQuantity(format!(
                "Quantity of line {} must be at least 1",
                self.id
            )));
        }
        Ok(())
    }

    /// Expands the line into `quantity` units with ordinals 1..=quantity.
    pub fn expand(&self) -> impl Iterator<Item = Item> + '_ {
        (1..=self.quantity).map(move |ordinal| Item {
            reference: ItemRef {
                line_id: self.id.clone(),
                ordinal,
            },
            label: self.label.clone(),
            length: self.length,
            width: self.width,
            height: self.height,
            weight: self.weight,
            allow_rotation: self.allow_rotation,
            stacking_limit: self.stacking_limit,
        })
    }
}

impl Dimensional for PlanLine {
    fn dimensions(&self) -> Vec3 {
        Vec3::new(self.length, self.width, self.height)
    }
}

/// Validates all lines and expands them into a flat unit list, in line order.
pub fn expand_lines(lines: &[PlanLine]) -> Result<Vec<Item>, ValidationError> {
    for line in lines {
        line.validate()?;
    }
    Ok(lines.iter().flat_map(|line| line.expand()).collect())
}
