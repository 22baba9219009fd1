// Copyright 2025 the Bracken Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Conservative integer quantization of world coordinates.

use core::fmt::Debug;
use core::marker::PhantomData;
use core::ops::{Add, BitAnd, BitOr, Sub};

use bracken_geom::{Aabb3, Vec3};

/// Integer width used for sweep-and-prune edge coordinates and handle
/// indices.
///
/// The 16-bit and 32-bit sweep variants differ only in this type: the
/// quantization sentinel, the mask that clears the min/max parity bit, and
/// the handle capacity.
pub trait SweepInt:
    Copy
    + Ord
    + Eq
    + Debug
    + Add<Output = Self>
    + Sub<Output = Self>
    + BitAnd<Output = Self>
    + BitOr<Output = Self>
{
    /// Zero.
    const ZERO: Self;
    /// One; also the max-edge parity bit.
    const ONE: Self;
    /// Largest quantized coordinate (the sentinel edge position).
    const SENTINEL: Self;
    /// Mask clearing bit 0, so quantized positions keep their min/max parity.
    const HANDLE_MASK: Self;
    /// Largest live handle count an instance may be constructed for.
    const MAX_HANDLES: usize;

    /// Widen from an array/handle index.
    fn from_usize(v: usize) -> Self;
    /// Narrow to an array index.
    fn to_usize(self) -> usize;
    /// Truncating cast of a value already clamped to `[0, SENTINEL]`.
    fn from_f32(v: f32) -> Self;
    /// Exact conversion to `f32` for unquantization.
    fn to_f32(self) -> f32;
}

impl SweepInt for u16 {
    const ZERO: Self = 0;
    const ONE: Self = 1;
    const SENTINEL: Self = 0xffff;
    const HANDLE_MASK: Self = 0xfffe;
    const MAX_HANDLES: usize = 32_766;

    #[inline]
    fn from_usize(v: usize) -> Self {
        debug_assert!(v <= Self::MAX as usize, "index exceeds u16 edge space");
        v as Self
    }

    #[inline]
    fn to_usize(self) -> usize {
        self as usize
    }

    #[inline]
    fn from_f32(v: f32) -> Self {
        v as Self
    }

    #[inline]
    fn to_f32(self) -> f32 {
        f32::from(self)
    }
}

impl SweepInt for u32 {
    const ZERO: Self = 0;
    const ONE: Self = 1;
    const SENTINEL: Self = 0x7fff_ffff;
    const HANDLE_MASK: Self = 0xffff_fffe;
    const MAX_HANDLES: usize = 2_147_483_646;

    #[inline]
    fn from_usize(v: usize) -> Self {
        debug_assert!(v <= Self::MAX as usize, "index exceeds u32 edge space");
        v as Self
    }

    #[inline]
    fn to_usize(self) -> usize {
        self as usize
    }

    #[inline]
    fn from_f32(v: f32) -> Self {
        v as Self
    }

    #[inline]
    fn to_f32(self) -> f32 {
        self as f32
    }
}

/// Affine map from a world box onto the integer grid `[0, SENTINEL]`, with
/// conservative rounding carried by the bit-0 parity: mins always quantize to
/// even positions (round down), maxes to odd (round up).
#[derive(Clone, Debug)]
pub struct Quantizer<I: SweepInt> {
    world_min: Vec3,
    world_max: Vec3,
    scale: Vec3,
    _int: PhantomData<I>,
}

impl<I: SweepInt> Quantizer<I> {
    /// Build the map for `world`. Coordinates outside the box saturate to
    /// the grid boundary; degenerate boxes (zero extent on an axis) are
    /// rejected by debug assertion.
    pub fn new(world: Aabb3) -> Self {
        let size = world.max - world.min;
        debug_assert!(
            size.x > 0.0 && size.y > 0.0 && size.z > 0.0,
            "world box must have positive extent on every axis"
        );
        let sentinel = I::SENTINEL.to_f32();
        Self {
            world_min: world.min,
            world_max: world.max,
            scale: Vec3::new(sentinel / size.x, sentinel / size.y, sentinel / size.z),
            _int: PhantomData,
        }
    }

    /// The world box this map covers.
    pub fn world(&self) -> Aabb3 {
        Aabb3::new(self.world_min, self.world_max)
    }

    /// Quantize `point`, clamping into the world box. `is_max` selects the
    /// rounding direction via the parity bit.
    pub fn quantize(&self, point: Vec3, is_max: bool) -> [I; 3] {
        let parity = if is_max { I::ONE } else { I::ZERO };
        let v = (point - self.world_min).mul_components(self.scale);
        let sentinel = I::SENTINEL.to_f32();
        let one = |value: f32| {
            if value <= 0.0 {
                parity
            } else if value >= sentinel {
                (I::SENTINEL & I::HANDLE_MASK) | parity
            } else {
                (I::from_f32(value) & I::HANDLE_MASK) | parity
            }
        };
        [one(v.x), one(v.y), one(v.z)]
    }

    /// Map a quantized min corner back to world space. The result is never
    /// greater than the point that produced it.
    pub fn unquantize_min(&self, q: [I; 3]) -> Vec3 {
        Vec3::new(
            self.world_min.x + q[0].to_f32() / self.scale.x,
            self.world_min.y + q[1].to_f32() / self.scale.y,
            self.world_min.z + q[2].to_f32() / self.scale.z,
        )
    }

    /// Map a quantized max corner back to world space, rounding one grid
    /// cell up. The result is never smaller than the point that produced it.
    /// The round-up happens in float space: a saturated max already sits at
    /// the integer ceiling.
    pub fn unquantize_max(&self, q: [I; 3]) -> Vec3 {
        Vec3::new(
            self.world_min.x + (q[0].to_f32() + 1.0) / self.scale.x,
            self.world_min.y + (q[1].to_f32() + 1.0) / self.scale.y,
            self.world_min.z + (q[2].to_f32() + 1.0) / self.scale.z,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{Quantizer, SweepInt};
    use bracken_geom::{Aabb3, Vec3};

    fn world() -> Aabb3 {
        Aabb3::new(Vec3::splat(-100.0), Vec3::splat(100.0))
    }

    #[test]
    fn min_edges_are_even_max_edges_odd() {
        let q: Quantizer<u16> = Quantizer::new(world());
        for p in [-73.2f32, -0.5, 0.0, 10.0, 99.9] {
            let point = Vec3::splat(p);
            let min = q.quantize(point, false);
            let max = q.quantize(point, true);
            for axis in 0..3 {
                assert_eq!(min[axis] & 1, 0, "min parity at {p}");
                assert_eq!(max[axis] & 1, 1, "max parity at {p}");
            }
        }
    }

    #[test]
    fn world_corners_hit_grid_bounds() {
        let q: Quantizer<u16> = Quantizer::new(world());
        let at_min = q.quantize(Vec3::splat(-100.0), false);
        assert_eq!(at_min, [0, 0, 0]);
        let at_max = q.quantize(Vec3::splat(100.0), false);
        assert_eq!(at_max, [0xfffe, 0xfffe, 0xfffe]);
    }

    #[test]
    fn out_of_world_points_saturate() {
        let q: Quantizer<u16> = Quantizer::new(world());
        assert_eq!(q.quantize(Vec3::splat(-1e6), false), [0, 0, 0]);
        assert_eq!(q.quantize(Vec3::splat(1e6), true), [0xffff, 0xffff, 0xffff]);
    }

    #[test]
    fn quantization_is_conservative() {
        let q: Quantizer<u16> = Quantizer::new(world());
        for p in [-99.7f32, -31.4, 0.0, 0.1, 42.0, 87.3] {
            let point = Vec3::splat(p);
            let back_min = q.unquantize_min(q.quantize(point, false));
            let back_max = q.unquantize_max(q.quantize(point, true));
            for axis in 0..3 {
                assert!(
                    back_min.axis(axis) <= p + 1e-4,
                    "min rounding must not exceed the input at {p}"
                );
                assert!(
                    back_max.axis(axis) >= p - 1e-4,
                    "max rounding must not undershoot the input at {p}"
                );
            }
        }
    }

    #[test]
    fn wide_variant_uses_its_own_sentinel() {
        let q: Quantizer<u32> = Quantizer::new(world());
        let at_max = q.quantize(Vec3::splat(100.0), true);
        assert_eq!(at_max, [u32::SENTINEL; 3]);
        let mid = q.quantize(Vec3::ZERO, false);
        for axis in 0..3 {
            let half = u32::SENTINEL / 2;
            assert!(mid[axis].abs_diff(half) <= 2, "midpoint lands mid-grid");
        }
    }
}
