//! Packing engine for loading unit items into a single container.
//!
//! Implements best-short-side-fit over a maximal free-space decomposition:
//! - every unit is tried in every permitted orientation against every free region
//! - the candidate leaving the least lateral margin wins
//! - ties go to the lowest position (z, then y, then x), then the lowest rotation code
//! - weight capacity, stacking limits and an optional support ratio are enforced
//!
//! Units that cannot be placed are reported with a reason; a partial packing is
//! a valid outcome, never an error.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::free_space::FreeSpaceSet;
use crate::geometry::{BoundingBox, footprint_overlap_area, footprints_overlap};
use crate::model::{Container, Item, Orientation, Placement, ValidationError};
use crate::types::{Dimensional, EPSILON_GENERAL, Vec3, Weighted};

/// Order in which the engine visits the units.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemOrder {
    /// Largest volume first, then heaviest, then input order.
    #[default]
    VolumeDescending,
    /// Heaviest first, then largest volume, then input order.
    WeightDescending,
    /// Exactly as given.
    InputOrder,
}

impl ItemOrder {
    /// Parses the short names used in configuration (`volume`, `weight`, `input`).
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "volume" | "volume_descending" => Some(ItemOrder::VolumeDescending),
            "weight" | "weight_descending" => Some(ItemOrder::WeightDescending),
            "input" | "input_order" => Some(ItemOrder::InputOrder),
            _ => None,
        }
    }
}

/// Configuration for the packing algorithm.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PackingConfig {
    /// Visitation order of the units
    pub item_order: ItemOrder,
    /// Upper bound on the free-space set; `None` means unbounded
    pub max_free_spaces: Option<usize>,
    /// Minimum share of the footprint that must rest on placed tops (0.0 disables the check)
    pub support_ratio: f64,
}

impl PackingConfig {
    pub const DEFAULT_SUPPORT_RATIO: f64 = 0.0;
    pub const DEFAULT_MAX_FREE_SPACES: Option<usize> = None;

    /// Creates a builder for a custom configuration.
    pub fn builder() -> PackingConfigBuilder {
        PackingConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(0.0..=1.0).contains(&self.support_ratio) {
            return Err(ValidationError::InvalidConfiguration(format!(
                "support ratio must be within 0..=1, got: {}",
                self.support_ratio
            )));
        }
        Ok(())
    }
}

impl Default for PackingConfig {
    fn default() -> Self {
        Self {
            item_order: ItemOrder::default(),
            max_free_spaces: Self::DEFAULT_MAX_FREE_SPACES,
            support_ratio: Self::DEFAULT_SUPPORT_RATIO,
        }
    }
}

/// Builder for [`PackingConfig`].
#[derive(Clone, Debug, Default)]
pub struct PackingConfigBuilder {
    config: PackingConfig,
}

impl PackingConfigBuilder {
    pub fn item_order(mut self, order: ItemOrder) -> Self {
        self.config.item_order = order;
        self
    }

    /// Caps the free-space set. 0 means unbounded.
    pub fn max_free_spaces(mut self, cap: usize) -> Self {
        self.config.max_free_spaces = (cap > 0).then_some(cap);
        self
    }

    pub fn support_ratio(mut self, ratio: f64) -> Self {
        self.config.support_ratio = ratio;
        self
    }

    pub fn build(self) -> PackingConfig {
        self.config
    }
}

/// Result of one packing run.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PackingResult {
    /// Placements in ascending step order
    pub placements: Vec<Placement>,
    pub unplaced: Vec<UnplacedItem>,
}

impl PackingResult {
    /// Whether every unit was placed.
    pub fn is_complete(&self) -> bool {
        self.unplaced.is_empty()
    }

    pub fn placed_count(&self) -> usize {
        self.placements.len()
    }

    pub fn unplaced_count(&self) -> usize {
        self.unplaced.len()
    }

    /// Total weight of all placed units in kg.
    pub fn placed_weight(&self) -> f64 {
        self.placements.iter().map(Weighted::weight).sum()
    }

    /// Total volume of all placed units in mm³.
    pub fn placed_volume(&self) -> f64 {
        self.placements.iter().map(Dimensional::volume).sum()
    }

    /// Number of unplaced units per source line.
    pub fn unplaced_by_line(&self) -> BTreeMap<String, u32> {
        count_by_line(&self.unplaced)
    }
}

/// Counts unplaced units per source line.
pub fn count_by_line(unplaced: &[UnplacedItem]) -> BTreeMap<String, u32> {
    let mut summary = BTreeMap::new();
    for entry in unplaced {
        *summary
            .entry(entry.item.reference.line_id.clone())
            .or_insert(0) += 1;
    }
    summary
}

/// A unit that could not be placed.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct UnplacedItem {
    pub item: Item,
    pub reason: UnplacedReason,
}

/// Reasons why a unit could not be placed.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnplacedReason {
    DimensionsExceedContainer,
    ExceedsWeightCapacity,
    StackingLimitReached,
    NoFreeSpace,
}

impl UnplacedReason {
    pub fn code(&self) -> &'static str {
        match self {
            UnplacedReason::DimensionsExceedContainer => "dimensions_exceed_container",
            UnplacedReason::ExceedsWeightCapacity => "exceeds_weight_capacity",
            UnplacedReason::StackingLimitReached => "stacking_limit_reached",
            UnplacedReason::NoFreeSpace => "no_free_space",
        }
    }
}

impl std::fmt::Display for UnplacedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnplacedReason::DimensionsExceedContainer => {
                write!(f, "Item does not fit the container in any permitted orientation")
            }
            UnplacedReason::ExceedsWeightCapacity => {
                write!(f, "Item would exceed the remaining payload of the container")
            }
            UnplacedReason::StackingLimitReached => {
                write!(f, "Every fitting position would exceed the stacking limit")
            }
            UnplacedReason::NoFreeSpace => {
                write!(f, "No free space left that can hold the item")
            }
        }
    }
}

/// Events emitted while packing, e.g. for live progress reporting.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum PackEvent {
    /// A unit was placed.
    ItemPlaced {
        step: u32,
        line_id: String,
        ordinal: u32,
        position: Vec3,
        extents: Vec3,
        rotation: u8,
        total_weight: f64,
    },
    /// A unit could not be placed.
    ItemRejected {
        line_id: String,
        ordinal: u32,
        reason_code: String,
        reason_text: String,
    },
    /// Packing finished.
    Finished { placed: usize, unplaced: usize },
}

/// Packs `items` into `container`.
///
/// Invalid input (bad container, empty or invalid item list, bad config) is
/// rejected before any packing work starts.
///
/// # Example
/// ```
/// use load_it_now::model::{Container, PlanLine, expand_lines};
/// use load_it_now::optimizer::{pack, PackingConfig};
///
/// let container = Container::new((1000.0, 1000.0, 1000.0), 1000.0).unwrap();
/// let items = expand_lines(&[PlanLine::new("crate", (400.0, 400.0, 400.0), 50.0).quantity(2)]).unwrap();
/// let result = pack(&container, &items, &PackingConfig::default()).unwrap();
/// assert!(result.is_complete());
/// assert_eq!(result.placements[1].step_number, 2);
/// ```
pub fn pack(
    container: &Container,
    items: &[Item],
    config: &PackingConfig,
) -> Result<PackingResult, ValidationError> {
    pack_with_progress(container, items, config, |_| {})
}

/// Like [`pack`], calling `on_event` for every placement, rejection and at the end.
pub fn pack_with_progress(
    container: &Container,
    items: &[Item],
    config: &PackingConfig,
    mut on_event: impl FnMut(&PackEvent),
) -> Result<PackingResult, ValidationError> {
    container.validate()?;
    config.validate()?;
    if items.is_empty() {
        return Err(ValidationError::EmptyItemList);
    }
    for item in items {
        item.validate()?;
    }

    let mut state = PackingState::new(container, config);
    let mut unplaced: Vec<UnplacedItem> = Vec::new();

    for item in visitation_order(items, config.item_order) {
        match state.place(item) {
            Ok(placement) => {
                on_event(&PackEvent::ItemPlaced {
                    step: placement.step_number,
                    line_id: placement.item.reference.line_id.clone(),
                    ordinal: placement.item.reference.ordinal,
                    position: placement.position,
                    extents: placement.extents,
                    rotation: placement.orientation.index(),
                    total_weight: state.placed_weight,
                });
            }
            Err(reason) => {
                debug!(
                    "item {}#{} not placed: {}",
                    item.reference.line_id,
                    item.reference.ordinal,
                    reason.code()
                );
                on_event(&PackEvent::ItemRejected {
                    line_id: item.reference.line_id.clone(),
                    ordinal: item.reference.ordinal,
                    reason_code: reason.code().to_string(),
                    reason_text: reason.to_string(),
                });
                unplaced.push(UnplacedItem {
                    item: item.clone(),
                    reason,
                });
            }
        }
    }

    on_event(&PackEvent::Finished {
        placed: state.placements.len(),
        unplaced: unplaced.len(),
    });
    Ok(PackingResult {
        placements: state.placements,
        unplaced,
    })
}

/// Sorts the units for visitation. The sort is stable, so equal keys keep input order.
fn visitation_order(items: &[Item], order: ItemOrder) -> Vec<&Item> {
    let mut ordered: Vec<&Item> = items.iter().collect();
    match order {
        ItemOrder::VolumeDescending => ordered.sort_by(|a, b| {
            b.volume()
                .total_cmp(&a.volume())
                .then_with(|| b.weight.total_cmp(&a.weight))
        }),
        ItemOrder::WeightDescending => ordered.sort_by(|a, b| {
            b.weight
                .total_cmp(&a.weight)
                .then_with(|| b.volume().total_cmp(&a.volume()))
        }),
        ItemOrder::InputOrder => {}
    }
    ordered
}

/// Mutable bookkeeping of one packing run.
struct PackingState<'a> {
    container: &'a Container,
    config: &'a PackingConfig,
    free_spaces: FreeSpaceSet,
    placements: Vec<Placement>,
    /// Stacking level of each placement, parallel to `placements`
    levels: Vec<u32>,
    placed_weight: f64,
}

/// A feasible (free space, orientation) pair.
#[derive(Clone, Copy, Debug)]
struct Candidate {
    score: f64,
    position: Vec3,
    orientation: Orientation,
    extents: Vec3,
    level: u32,
}

impl<'a> PackingState<'a> {
    fn new(container: &'a Container, config: &'a PackingConfig) -> Self {
        Self {
            container,
            config,
            free_spaces: FreeSpaceSet::new(container.bounds(), config.max_free_spaces),
            placements: Vec::new(),
            levels: Vec::new(),
            placed_weight: 0.0,
        }
    }

    /// Places `item` at its best candidate or explains why it cannot be placed.
    fn place(&mut self, item: &Item) -> Result<Placement, UnplacedReason> {
        let orientations = item.permitted_orientations();
        let container_dims = self.container.dimensions();
        if !orientations
            .iter()
            .any(|o| o.apply(item.dimensions()).fits_within(&container_dims))
        {
            return Err(UnplacedReason::DimensionsExceedContainer);
        }

        if self.placed_weight + item.weight > self.container.max_weight + EPSILON_GENERAL {
            return Err(UnplacedReason::ExceedsWeightCapacity);
        }

        let mut best: Option<Candidate> = None;
        let mut stacking_blocked = false;

        for &orientation in &orientations {
            let extents = orientation.apply(item.dimensions());
            for (_, space) in self.free_spaces.iter() {
                let room = space.extents();
                if !extents.fits_within(&room) {
                    continue;
                }

                let position = space.min;
                let candidate_box = BoundingBox::from_position_and_dims(position, extents);

                let level = self.stacking_level(item, &candidate_box);
                if item
                    .effective_stacking_limit()
                    .is_some_and(|limit| level > limit)
                {
                    stacking_blocked = true;
                    continue;
                }

                if !self.has_sufficient_support(&candidate_box) {
                    continue;
                }

                let candidate = Candidate {
                    score: (room.x - extents.x).min(room.y - extents.y),
                    position,
                    orientation,
                    extents,
                    level,
                };
                if best.is_none_or(|current| is_better(&candidate, &current)) {
                    best = Some(candidate);
                }
            }
        }

        let Some(chosen) = best else {
            return Err(if stacking_blocked {
                UnplacedReason::StackingLimitReached
            } else {
                UnplacedReason::NoFreeSpace
            });
        };

        let placement = Placement {
            item: item.clone(),
            orientation: chosen.orientation,
            position: chosen.position,
            extents: chosen.extents,
            step_number: self.placements.len() as u32 + 1,
        };

        self.free_spaces.occupy(&placement.bounding_box());
        self.placed_weight += item.weight;
        self.levels.push(chosen.level);
        self.placements.push(placement.clone());

        debug!(
            "step {}: {}#{} at ({}, {}, {}) rotation {} score {:.3}",
            placement.step_number,
            item.reference.line_id,
            item.reference.ordinal,
            chosen.position.x,
            chosen.position.y,
            chosen.position.z,
            chosen.orientation.index(),
            chosen.score
        );
        trace!("{} free spaces after step", self.free_spaces.len());

        Ok(placement)
    }

    /// Level of `candidate` in a stack of units from the same line (1 = bottom).
    ///
    /// A unit stacks on another when its bottom meets the other's top and
    /// their footprints overlap.
    fn stacking_level(&self, item: &Item, candidate: &BoundingBox) -> u32 {
        let z = candidate.min.z;
        if z <= EPSILON_GENERAL {
            return 1;
        }

        self.placements
            .iter()
            .zip(&self.levels)
            .filter(|(placed, _)| placed.item.reference.line_id == item.reference.line_id)
            .filter(|(placed, _)| (placed.top_z() - z).abs() <= EPSILON_GENERAL)
            .filter(|(placed, _)| footprints_overlap(&placed.bounding_box(), candidate))
            .map(|(_, &level)| level + 1)
            .max()
            .unwrap_or(1)
    }

    /// Checks the share of the footprint resting on placed tops.
    fn has_sufficient_support(&self, candidate: &BoundingBox) -> bool {
        if self.config.support_ratio <= 0.0 || candidate.min.z <= EPSILON_GENERAL {
            return true;
        }

        let base_area = candidate.base_area();
        if base_area <= EPSILON_GENERAL {
            return false;
        }

        let support_area: f64 = self
            .placements
            .iter()
            .map(|p| p.bounding_box())
            .filter(|b| (b.top_z() - candidate.min.z).abs() <= EPSILON_GENERAL)
            .map(|b| footprint_overlap_area(&b, candidate))
            .sum();

        support_area / base_area + EPSILON_GENERAL >= self.config.support_ratio
    }
}

/// Candidate ordering: score, then z, y, x, then rotation code. Lower is better.
fn is_better(new: &Candidate, current: &Candidate) -> bool {
    let ordering = compare_with_epsilon(new.score, current.score, EPSILON_GENERAL)
        .then_with(|| compare_with_epsilon(new.position.z, current.position.z, EPSILON_GENERAL))
        .then_with(|| compare_with_epsilon(new.position.y, current.position.y, EPSILON_GENERAL))
        .then_with(|| compare_with_epsilon(new.position.x, current.position.x, EPSILON_GENERAL))
        .then_with(|| new.orientation.cmp(&current.orientation));
    ordering == Ordering::Less
}

/// Compares two values with tolerance.
fn compare_with_epsilon(a: f64, b: f64, eps: f64) -> Ordering {
    if (a - b).abs() <= eps {
        Ordering::Equal
    } else if a < b {
        Ordering::Less
    } else {
        Ordering::Greater
    }
}
