// Copyright 2025 the Bracken Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Axis-aligned bounding boxes in 3D.

use crate::vec3::Vec3;

/// Axis-aligned bounding box, defined by its min and max corners.
///
/// Note that the faces of the box are considered part of it: two boxes that
/// share a face are reported as overlapping by [`Aabb3::overlaps`]. The
/// sweep-and-prune backend applies its own, stricter edge test; this type's
/// semantics match the bounding volume tree, which must stay conservative.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Aabb3 {
    /// Minimum corner.
    pub min: Vec3,
    /// Maximum corner.
    pub max: Vec3,
}

impl Aabb3 {
    /// Create a box from min/max corners.
    #[inline(always)]
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Create a box from a center point and half-extents.
    #[inline]
    pub fn from_center_extent(center: Vec3, extent: Vec3) -> Self {
        Self::new(center - extent, center + extent)
    }

    /// Center point.
    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Half-extents.
    #[inline]
    pub fn extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Whether this box overlaps `other`, faces included.
    #[inline]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Whether this box fully contains `other`.
    #[inline]
    pub fn contains(&self, other: &Self) -> bool {
        self.min.x <= other.min.x
            && self.min.y <= other.min.y
            && self.min.z <= other.min.z
            && self.max.x >= other.max.x
            && self.max.y >= other.max.y
            && self.max.z >= other.max.z
    }

    /// Whether the point lies inside the box, faces included.
    #[inline]
    pub fn contains_point(&self, p: Vec3) -> bool {
        p.x >= self.min.x
            && p.y >= self.min.y
            && p.z >= self.min.z
            && p.x <= self.max.x
            && p.y <= self.max.y
            && p.z <= self.max.z
    }

    /// The smallest box enclosing both `self` and `other`.
    #[inline]
    pub fn union(&self, other: &Self) -> Self {
        Self::new(self.min.min(other.min), self.max.max(other.max))
    }

    /// Grow the box by `amount` on every face.
    #[inline]
    pub fn expand(&mut self, amount: Vec3) {
        self.min = self.min - amount;
        self.max = self.max + amount;
    }

    /// Grow the box by `e`, but only in the direction `e` points.
    ///
    /// A positive component extends the max corner, a negative one the min
    /// corner. This is the velocity-fattening primitive: the box swells where
    /// the object is headed, not behind it.
    #[inline]
    pub fn signed_expand(&mut self, e: Vec3) {
        for axis in 0..3 {
            let v = e.axis(axis);
            if v > 0.0 {
                self.max.set_axis(axis, self.max.axis(axis) + v);
            } else {
                self.min.set_axis(axis, self.min.axis(axis) + v);
            }
        }
    }

    /// Surface area of the box. Used as the growth metric when picking an
    /// insertion subtree.
    #[inline]
    pub fn surface_area(&self) -> f32 {
        let d = self.max - self.min;
        2.0 * (d.x * d.y + d.y * d.z + d.z * d.x)
    }

    /// Manhattan distance between the (doubled) centers of two boxes.
    #[inline]
    pub fn proximity(&self, other: &Self) -> f32 {
        let d = (self.min + self.max) - (other.min + other.max);
        let d = d.abs();
        d.x + d.y + d.z
    }
}
