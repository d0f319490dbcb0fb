//! Geometric primitives for 3D collision detection and free-space carving.
//!
//! All functions are pure and operate on immutable [`BoundingBox`] values.
//! Comparisons absorb floating-point error with [`EPSILON_GENERAL`], so boxes
//! that merely touch (share a face, edge or corner) never count as overlapping.

use serde::{Deserialize, Serialize};

use crate::types::{Dimensional, EPSILON_GENERAL, Vec3};

/// Represents an Axis-Aligned Bounding Box (AABB).
///
/// Used both for placed items and for the free regions of a container.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Minimum corner (position)
    pub min: Vec3,
    /// Maximum corner (position + extents)
    pub max: Vec3,
}

impl BoundingBox {
    /// Creates a new bounding box.
    #[inline]
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Creates a bounding box from position and extents.
    #[inline]
    pub fn from_position_and_dims(position: Vec3, dims: Vec3) -> Self {
        Self {
            min: position,
            max: position + dims,
        }
    }

    /// Returns the extents (length, width, height).
    #[inline]
    pub fn extents(&self) -> Vec3 {
        self.max - self.min
    }

    /// Returns the top (Z maximum).
    #[inline]
    pub fn top_z(&self) -> f64 {
        self.max.z
    }

    /// A box is degenerate when any extent collapses to (almost) zero.
    #[inline]
    pub fn is_degenerate(&self) -> bool {
        let e = self.extents();
        e.x <= EPSILON_GENERAL || e.y <= EPSILON_GENERAL || e.z <= EPSILON_GENERAL
    }
}

impl Dimensional for BoundingBox {
    fn dimensions(&self) -> Vec3 {
        self.extents()
    }
}

/// Calculates the overlap of two intervals in one dimension.
///
/// # Returns
/// Length of the overlap, at least 0.0
///
/// # Example
/// ```
/// use load_it_now::geometry::overlap_1d;
///
/// assert_eq!(overlap_1d(0.0, 5.0, 3.0, 8.0), 2.0);
/// assert_eq!(overlap_1d(0.0, 5.0, 5.0, 8.0), 0.0);
/// ```
pub fn overlap_1d(a1: f64, a2: f64, b1: f64, b2: f64) -> f64 {
    (a2.min(b2) - a1.max(b1)).max(0.0)
}

/// Calculates the overlap area of two boxes projected onto the XY plane.
pub fn footprint_overlap_area(a: &BoundingBox, b: &BoundingBox) -> f64 {
    let overlap_x = overlap_1d(a.min.x, a.max.x, b.min.x, b.max.x);
    let overlap_y = overlap_1d(a.min.y, a.max.y, b.min.y, b.max.y);
    overlap_x * overlap_y
}

/// Checks whether the XY footprints of two boxes share a non-zero area.
pub fn footprints_overlap(a: &BoundingBox, b: &BoundingBox) -> bool {
    overlap_1d(a.min.x, a.max.x, b.min.x, b.max.x) > EPSILON_GENERAL
        && overlap_1d(a.min.y, a.max.y, b.min.y, b.max.y) > EPSILON_GENERAL
}

/// Checks whether the open interiors of two boxes intersect.
///
/// Separating Axis Theorem for AABBs: the boxes do NOT overlap if they are
/// separated (or merely touching) along at least one axis.
///
/// # Example
/// ```
/// use load_it_now::geometry::{overlaps, BoundingBox};
/// use load_it_now::types::Vec3;
///
/// let a = BoundingBox::from_position_and_dims(Vec3::zero(), Vec3::new(10.0, 10.0, 10.0));
/// let b = BoundingBox::from_position_and_dims(Vec3::new(10.0, 0.0, 0.0), Vec3::new(10.0, 10.0, 10.0));
/// assert!(!overlaps(&a, &b)); // touching faces
/// ```
pub fn overlaps(a: &BoundingBox, b: &BoundingBox) -> bool {
    a.min.x + EPSILON_GENERAL < b.max.x
        && b.min.x + EPSILON_GENERAL < a.max.x
        && a.min.y + EPSILON_GENERAL < b.max.y
        && b.min.y + EPSILON_GENERAL < a.max.y
        && a.min.z + EPSILON_GENERAL < b.max.z
        && b.min.z + EPSILON_GENERAL < a.max.z
}

/// Checks whether `inner` lies completely inside `outer`.
pub fn contains(outer: &BoundingBox, inner: &BoundingBox) -> bool {
    inner.min.x + EPSILON_GENERAL >= outer.min.x
        && inner.min.y + EPSILON_GENERAL >= outer.min.y
        && inner.min.z + EPSILON_GENERAL >= outer.min.z
        && inner.max.x <= outer.max.x + EPSILON_GENERAL
        && inner.max.y <= outer.max.y + EPSILON_GENERAL
        && inner.max.z <= outer.max.z + EPSILON_GENERAL
}

/// Returns the common region of two boxes, if their interiors overlap.
pub fn intersection(a: &BoundingBox, b: &BoundingBox) -> Option<BoundingBox> {
    if !overlaps(a, b) {
        return None;
    }
    Some(BoundingBox::new(
        Vec3::new(a.min.x.max(b.min.x), a.min.y.max(b.min.y), a.min.z.max(b.min.z)),
        Vec3::new(a.max.x.min(b.max.x), a.max.y.min(b.max.y), a.max.z.min(b.max.z)),
    ))
}

/// Volume shared by two boxes (0.0 when they only touch or are apart).
pub fn intersect_volume(a: &BoundingBox, b: &BoundingBox) -> f64 {
    intersection(a, b).map_or(0.0, |common| common.extents().volume())
}

/// Carves `occupied` out of `space`.
///
/// Produces up to six maximal residual regions: for every axis, the slab of
/// `space` in front of `occupied` and the slab behind it, each spanning the
/// full extent of `space` along the other two axes. Residuals may overlap one
/// another but none of them overlaps `occupied`. Degenerate slabs are dropped.
/// If the two boxes do not overlap, `space` is returned untouched.
pub fn subtract(space: &BoundingBox, occupied: &BoundingBox) -> Vec<BoundingBox> {
    if !overlaps(space, occupied) {
        return vec![*space];
    }

    let mut residuals = Vec::with_capacity(6);
    for axis in 0..3 {
        let space_min = space.min.axis(axis);
        let space_max = space.max.axis(axis);
        let occupied_min = occupied.min.axis(axis);
        let occupied_max = occupied.max.axis(axis);

        if occupied_min > space_min + EPSILON_GENERAL {
            residuals.push(BoundingBox::new(
                space.min,
                space.max.with_axis(axis, occupied_min),
            ));
        }
        if occupied_max < space_max - EPSILON_GENERAL {
            residuals.push(BoundingBox::new(
                space.min.with_axis(axis, occupied_max),
                space.max,
            ));
        }
    }

    residuals.retain(|r| !r.is_degenerate());
    residuals
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube(x: f64, y: f64, z: f64, edge: f64) -> BoundingBox {
        BoundingBox::from_position_and_dims(Vec3::new(x, y, z), Vec3::new(edge, edge, edge))
    }

    #[test]
    fn overlapping_boxes_are_detected() {
        let a = cube(0.0, 0.0, 0.0, 10.0);
        let b = cube(5.0, 5.0, 5.0, 10.0);
        let c = cube(20.0, 20.0, 20.0, 10.0);

        assert!(overlaps(&a, &b));
        assert!(overlaps(&b, &a));
        assert!(!overlaps(&a, &c));
    }

    #[test]
    fn touching_boxes_do_not_overlap() {
        let a = cube(0.0, 0.0, 0.0, 10.0);
        assert!(!overlaps(&a, &cube(10.0, 0.0, 0.0, 10.0)));
        assert!(!overlaps(&a, &cube(0.0, 10.0, 0.0, 10.0)));
        assert!(!overlaps(&a, &cube(0.0, 0.0, 10.0, 10.0)));
        // within epsilon of touching
        assert!(!overlaps(&a, &cube(10.0 - EPSILON_GENERAL / 2.0, 0.0, 0.0, 10.0)));
    }

    #[test]
    fn containment() {
        let outer = cube(0.0, 0.0, 0.0, 10.0);
        assert!(contains(&outer, &cube(2.0, 2.0, 2.0, 5.0)));
        assert!(contains(&outer, &outer));
        assert!(!contains(&outer, &cube(6.0, 0.0, 0.0, 5.0)));
        assert!(!contains(&cube(2.0, 2.0, 2.0, 5.0), &outer));
    }

    #[test]
    fn intersection_volume() {
        let a = cube(0.0, 0.0, 0.0, 10.0);
        let b = cube(5.0, 5.0, 5.0, 10.0);
        assert!((intersect_volume(&a, &b) - 125.0).abs() < EPSILON_GENERAL);
        assert_eq!(intersect_volume(&a, &cube(10.0, 0.0, 0.0, 10.0)), 0.0);

        let common = intersection(&a, &b).unwrap();
        assert_eq!(common.min, Vec3::new(5.0, 5.0, 5.0));
        assert_eq!(common.max, Vec3::new(10.0, 10.0, 10.0));
    }

    #[test]
    fn footprint_overlap() {
        let a = cube(0.0, 0.0, 0.0, 10.0);
        let b = cube(5.0, 5.0, 30.0, 10.0);
        assert!((footprint_overlap_area(&a, &b) - 25.0).abs() < EPSILON_GENERAL);
        assert!(footprints_overlap(&a, &b));
        assert!(!footprints_overlap(&a, &cube(10.0, 0.0, 0.0, 10.0)));
    }

    #[test]
    fn subtract_corner_box_leaves_three_slabs() {
        let space = cube(0.0, 0.0, 0.0, 1000.0);
        let placed = cube(0.0, 0.0, 0.0, 400.0);

        let residuals = subtract(&space, &placed);
        assert_eq!(residuals.len(), 3);
        assert!(residuals.contains(&BoundingBox::new(
            Vec3::new(400.0, 0.0, 0.0),
            Vec3::new(1000.0, 1000.0, 1000.0)
        )));
        assert!(residuals.contains(&BoundingBox::new(
            Vec3::new(0.0, 400.0, 0.0),
            Vec3::new(1000.0, 1000.0, 1000.0)
        )));
        assert!(residuals.contains(&BoundingBox::new(
            Vec3::new(0.0, 0.0, 400.0),
            Vec3::new(1000.0, 1000.0, 1000.0)
        )));
        for r in &residuals {
            assert!(!overlaps(r, &placed));
            assert!(contains(&space, r));
        }
    }

    #[test]
    fn subtract_interior_box_leaves_six_slabs() {
        let space = cube(0.0, 0.0, 0.0, 30.0);
        let placed = cube(10.0, 10.0, 10.0, 10.0);

        let residuals = subtract(&space, &placed);
        assert_eq!(residuals.len(), 6);
        for r in &residuals {
            assert!(!overlaps(r, &placed));
        }
    }

    #[test]
    fn subtract_full_box_leaves_nothing() {
        let space = cube(0.0, 0.0, 0.0, 10.0);
        assert!(subtract(&space, &space).is_empty());
    }

    #[test]
    fn subtract_disjoint_box_is_identity() {
        let space = cube(0.0, 0.0, 0.0, 10.0);
        let residuals = subtract(&space, &cube(10.0, 0.0, 0.0, 10.0));
        assert_eq!(residuals, vec![space]);
    }
}
