//! Common types and traits for 3D geometry.
//!
//! Axis convention used throughout the crate: `x` runs along the container
//! length, `y` along its width and `z` along its height. All lengths are in
//! millimeters, all weights in kilograms.

use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

/// Global numerical tolerance for floating-point comparisons.
///
/// Absorbs placement error in overlap, containment and fit tests. It is a
/// crate-wide constant and is never passed per call.
pub const EPSILON_GENERAL: f64 = 1e-6;

/// Represents a 3D vector or point in space.
///
/// Used for positions, extents, and calculations in 3D space.
///
/// # Examples
/// ```
/// use load_it_now::types::Vec3;
///
/// let position = Vec3::new(1.0, 2.0, 3.0);
/// let extents = Vec3::new(10.0, 20.0, 30.0);
/// let far_corner = position + extents;
/// assert_eq!(far_corner, Vec3::new(11.0, 22.0, 33.0));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    /// Creates a new 3D vector.
    ///
    /// # Parameters
    /// * `x` - X component (length axis)
    /// * `y` - Y component (width axis)
    /// * `z` - Z component (height axis)
    #[inline]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Creates a zero vector (origin).
    #[inline]
    pub const fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    /// Component by axis index (0 = x, 1 = y, 2 = z).
    #[inline]
    pub fn axis(&self, index: usize) -> f64 {
        match index {
            0 => self.x,
            1 => self.y,
            _ => self.z,
        }
    }

    /// Returns a copy with one axis replaced.
    #[inline]
    pub fn with_axis(mut self, index: usize, value: f64) -> Self {
        match index {
            0 => self.x = value,
            1 => self.y = value,
            _ => self.z = value,
        }
        self
    }

    /// Calculates the volume (product of all components).
    ///
    /// Useful for extent vectors.
    #[inline]
    pub fn volume(&self) -> f64 {
        self.x * self.y * self.z
    }

    /// Calculates the base area (X × Y product).
    #[inline]
    pub fn base_area(&self) -> f64 {
        self.x * self.y
    }

    /// Checks if the vector fits within another vector (component-wise <=).
    ///
    /// # Parameters
    /// * `container` - The outer vector (e.g., free space extents)
    #[inline]
    pub fn fits_within(&self, container: &Self) -> bool {
        self.x <= container.x + EPSILON_GENERAL
            && self.y <= container.y + EPSILON_GENERAL
            && self.z <= container.z + EPSILON_GENERAL
    }
}

impl Add for Vec3 {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self::Output {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self::Output {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl From<(f64, f64, f64)> for Vec3 {
    #[inline]
    fn from(tuple: (f64, f64, f64)) -> Self {
        Self::new(tuple.0, tuple.1, tuple.2)
    }
}

/// Trait for objects with 3D dimensions.
///
/// Provides a common interface for all objects with spatial extent.
pub trait Dimensional {
    /// Returns the dimensions of the object.
    fn dimensions(&self) -> Vec3;

    /// Calculates the volume.
    fn volume(&self) -> f64 {
        self.dimensions().volume()
    }

    /// Calculates the base area.
    fn base_area(&self) -> f64 {
        self.dimensions().base_area()
    }
}

/// Trait for objects with weight.
pub trait Weighted {
    /// Returns the weight in kg.
    fn weight(&self) -> f64;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec3_operations() {
        let a = Vec3::new(1.0, 2.0, 3.0);
        let b = Vec3::new(4.0, 5.0, 6.0);

        assert_eq!(a + b, Vec3::new(5.0, 7.0, 9.0));
        assert_eq!(b - a, Vec3::new(3.0, 3.0, 3.0));
    }

    #[test]
    fn test_vec3_volume_and_area() {
        let dims = Vec3::new(10.0, 20.0, 30.0);
        assert!((dims.volume() - 6000.0).abs() < EPSILON_GENERAL);
        assert!((dims.base_area() - 200.0).abs() < EPSILON_GENERAL);
    }

    #[test]
    fn test_vec3_fits_within() {
        let small = Vec3::new(5.0, 5.0, 5.0);
        let large = Vec3::new(10.0, 10.0, 10.0);

        assert!(small.fits_within(&large));
        assert!(!large.fits_within(&small));
        assert!(Vec3::new(10.0 + EPSILON_GENERAL / 2.0, 1.0, 1.0).fits_within(&large));
    }

    #[test]
    fn test_axis_access() {
        let v = Vec3::new(1.0, 2.0, 3.0);
        assert_eq!(v.axis(0), 1.0);
        assert_eq!(v.axis(2), 3.0);
        assert_eq!(v.with_axis(1, 9.0), Vec3::new(1.0, 9.0, 3.0));
    }
}
