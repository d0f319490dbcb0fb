//! Maximal free-space bookkeeping for the packing engine.
//!
//! The set starts as one region spanning the whole container. Every placement
//! carves the occupied box out of each region it intersects, replacing that
//! region by its residual slabs. Regions may overlap each other, but never a
//! placed item. Regions are stored in a generational arena, so a key held
//! across a removal can never alias a newer region.

use std::cmp::Ordering;

use log::trace;
use slotmap::{SlotMap, new_key_type};

use crate::geometry::{BoundingBox, contains, overlaps, subtract};
use crate::types::Dimensional;

new_key_type! {
    /// Key of a free region in a [`FreeSpaceSet`].
    pub struct SpaceKey;
}

/// The set of currently empty regions of a container.
#[derive(Clone, Debug)]
pub struct FreeSpaceSet {
    spaces: SlotMap<SpaceKey, BoundingBox>,
    max_spaces: Option<usize>,
}

impl FreeSpaceSet {
    /// Creates the initial set: one region equal to `bounds`.
    ///
    /// `max_spaces` bounds the set size; `None` (or 0) means unbounded.
    pub fn new(bounds: BoundingBox, max_spaces: Option<usize>) -> Self {
        let mut spaces = SlotMap::with_key();
        spaces.insert(bounds);
        Self {
            spaces,
            max_spaces: max_spaces.filter(|&cap| cap > 0),
        }
    }

    pub fn len(&self) -> usize {
        self.spaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spaces.is_empty()
    }

    /// Iterates the regions in arena order, which is deterministic for a
    /// given sequence of operations.
    pub fn iter(&self) -> impl Iterator<Item = (SpaceKey, &BoundingBox)> {
        self.spaces.iter()
    }

    /// Marks `occupied` as filled.
    ///
    /// Every region overlapping `occupied` is split into its residuals. New
    /// residuals already covered by another region are dropped, and regions
    /// swallowed by a new residual are removed. Finally the set is pruned to
    /// its cap, smallest regions first.
    pub fn occupy(&mut self, occupied: &BoundingBox) {
        let hit: Vec<SpaceKey> = self
            .spaces
            .iter()
            .filter(|(_, space)| overlaps(space, occupied))
            .map(|(key, _)| key)
            .collect();

        let mut residuals = Vec::new();
        for key in hit {
            if let Some(space) = self.spaces.remove(key) {
                residuals.extend(subtract(&space, occupied));
            }
        }

        for residual in residuals {
            self.insert_maximal(residual);
        }

        self.prune();
    }

    /// Inserts `candidate` unless an existing region already contains it.
    ///
    /// Returns whether it was inserted.
    fn insert_maximal(&mut self, candidate: BoundingBox) -> bool {
        if self
            .spaces
            .values()
            .any(|existing| contains(existing, &candidate))
        {
            return false;
        }

        self.spaces
            .retain(|_, existing| !contains(&candidate, existing));
        self.spaces.insert(candidate);
        true
    }

    fn prune(&mut self) {
        let Some(cap) = self.max_spaces else {
            return;
        };
        if self.spaces.len() <= cap {
            return;
        }

        let mut ranked: Vec<(SpaceKey, BoundingBox)> =
            self.spaces.iter().map(|(key, space)| (key, *space)).collect();
        // smallest first; position breaks volume ties so pruning stays deterministic
        ranked.sort_by(|(_, a), (_, b)| {
            a.volume()
                .total_cmp(&b.volume())
                .then_with(|| compare_corners(b, a))
        });

        let excess = self.spaces.len() - cap;
        for (key, space) in ranked.into_iter().take(excess) {
            trace!("pruning free space {:?} ({} mm³)", space, space.volume());
            self.spaces.remove(key);
        }
    }
}

/// Orders two regions by their minimum corner: lowest z, then y, then x.
fn compare_corners(a: &BoundingBox, b: &BoundingBox) -> Ordering {
    a.min
        .z
        .total_cmp(&b.min.z)
        .then_with(|| a.min.y.total_cmp(&b.min.y))
        .then_with(|| a.min.x.total_cmp(&b.min.x))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Vec3;

    fn bounds(edge: f64) -> BoundingBox {
        BoundingBox::from_position_and_dims(Vec3::zero(), Vec3::new(edge, edge, edge))
    }

    fn boxed(pos: (f64, f64, f64), dims: (f64, f64, f64)) -> BoundingBox {
        BoundingBox::from_position_and_dims(pos.into(), dims.into())
    }

    #[test]
    fn starts_with_whole_container() {
        let set = FreeSpaceSet::new(bounds(1000.0), None);
        assert_eq!(set.len(), 1);
        let (_, only) = set.iter().next().unwrap();
        assert_eq!(*only, bounds(1000.0));
    }

    #[test]
    fn corner_placement_yields_three_maximal_spaces() {
        let mut set = FreeSpaceSet::new(bounds(1000.0), None);
        set.occupy(&boxed((0.0, 0.0, 0.0), (400.0, 400.0, 400.0)));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn no_space_overlaps_occupied_boxes() {
        let mut set = FreeSpaceSet::new(bounds(1000.0), None);
        let placed = [
            boxed((0.0, 0.0, 0.0), (400.0, 400.0, 400.0)),
            boxed((400.0, 0.0, 0.0), (300.0, 500.0, 200.0)),
            boxed((0.0, 400.0, 0.0), (400.0, 600.0, 700.0)),
        ];
        for occupied in &placed {
            set.occupy(occupied);
        }
        for (_, space) in set.iter() {
            for occupied in &placed {
                assert!(!overlaps(space, occupied), "{space:?} overlaps {occupied:?}");
            }
        }
    }

    #[test]
    fn contained_spaces_are_not_kept() {
        let mut set = FreeSpaceSet::new(bounds(1000.0), None);
        set.occupy(&boxed((0.0, 0.0, 0.0), (400.0, 400.0, 400.0)));
        set.occupy(&boxed((400.0, 0.0, 0.0), (400.0, 400.0, 400.0)));

        let spaces: Vec<BoundingBox> = set.iter().map(|(_, s)| *s).collect();
        for (i, a) in spaces.iter().enumerate() {
            for (j, b) in spaces.iter().enumerate() {
                if i != j {
                    assert!(!contains(a, b), "{b:?} is inside {a:?}");
                }
            }
        }
    }

    #[test]
    fn cap_prunes_smallest_spaces() {
        let mut set = FreeSpaceSet::new(bounds(1000.0), Some(2));
        set.occupy(&boxed((0.0, 0.0, 0.0), (400.0, 400.0, 400.0)));
        assert_eq!(set.len(), 2);
        // all three residuals have equal volume; the highest corner goes first
        assert!(set.iter().all(|(_, s)| s.min.z == 0.0));
    }

    #[test]
    fn full_occupation_empties_the_set() {
        let mut set = FreeSpaceSet::new(bounds(10.0), None);
        set.occupy(&bounds(10.0));
        assert!(set.is_empty());
    }

    #[test]
    fn corner_ordering() {
        let low = boxed((5.0, 5.0, 0.0), (1.0, 1.0, 1.0));
        let high = boxed((0.0, 0.0, 1.0), (1.0, 1.0, 1.0));
        assert_eq!(compare_corners(&low, &high), Ordering::Less);
    }
}
