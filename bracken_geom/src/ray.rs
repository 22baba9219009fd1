// Copyright 2025 the Bracken Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Precomputed ray state and the slab intersection test.

use crate::vec3::{Vec3, max_f, min_f};

/// Per-ray state precomputed once and reused across every node visited.
///
/// The traversal promises never to mutate this; the *callback* may shrink
/// [`RayCast::lambda_max`] as closer hits are found, which prunes the rest of
/// the walk. Setting it to `0.0` cancels the traversal outright.
#[derive(Clone, Debug)]
pub struct RayCast {
    /// Componentwise reciprocal of the normalized ray direction. Zero
    /// components map to `f32::MAX` so the slab test stays branch-free.
    pub direction_inverse: Vec3,
    /// Per-axis sign of the direction (1 when negative), used to pick the
    /// near slab without comparisons.
    pub signs: [usize; 3],
    /// Length of the ray segment along its direction; hits beyond this are
    /// ignored.
    pub lambda_max: f32,
}

impl RayCast {
    /// Build ray state for the segment `from..to`.
    pub fn new(from: Vec3, to: Vec3) -> Self {
        let dir = (to - from).normalized();
        let inv = |c: f32| if c == 0.0 { f32::MAX } else { 1.0 / c };
        let direction_inverse = Vec3::new(inv(dir.x), inv(dir.y), inv(dir.z));
        let signs = [
            usize::from(direction_inverse.x < 0.0),
            usize::from(direction_inverse.y < 0.0),
            usize::from(direction_inverse.z < 0.0),
        ];
        Self {
            direction_inverse,
            signs,
            lambda_max: dir.dot(to - from),
        }
    }
}

/// Slab test of a ray against the box spanned by `bounds[0]..bounds[1]`.
///
/// Returns the entry parameter when the ray crosses the box within
/// `(lambda_min, lambda_max)`, `None` otherwise. `inv_dir` and `signs` come
/// from a [`RayCast`].
pub fn ray_slab_hit(
    from: Vec3,
    inv_dir: Vec3,
    signs: [usize; 3],
    bounds: &[Vec3; 2],
    lambda_min: f32,
    lambda_max: f32,
) -> Option<f32> {
    let mut tmin = (bounds[signs[0]].x - from.x) * inv_dir.x;
    let mut tmax = (bounds[1 - signs[0]].x - from.x) * inv_dir.x;

    let tymin = (bounds[signs[1]].y - from.y) * inv_dir.y;
    let tymax = (bounds[1 - signs[1]].y - from.y) * inv_dir.y;
    if (tmin > tymax) || (tymin > tmax) {
        return None;
    }
    tmin = max_f(tmin, tymin);
    tmax = min_f(tmax, tymax);

    let tzmin = (bounds[signs[2]].z - from.z) * inv_dir.z;
    let tzmax = (bounds[1 - signs[2]].z - from.z) * inv_dir.z;
    if (tmin > tzmax) || (tzmin > tmax) {
        return None;
    }
    tmin = max_f(tmin, tzmin);
    tmax = min_f(tmax, tzmax);

    if tmin < lambda_max && tmax > lambda_min {
        Some(tmin)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::{RayCast, Vec3, ray_slab_hit};

    #[test]
    fn axis_aligned_ray_hits_box() {
        let from = Vec3::new(0.0, -5.0, 0.0);
        let to = Vec3::new(0.0, 30.0, 0.0);
        let ray = RayCast::new(from, to);
        let bounds = [Vec3::new(-1.0, 0.0, -1.0), Vec3::new(1.0, 1.0, 1.0)];
        let hit = ray_slab_hit(from, ray.direction_inverse, ray.signs, &bounds, 0.0, ray.lambda_max);
        assert!(hit.is_some());
        assert!((hit.unwrap() - 5.0).abs() < 1e-5);
    }

    #[test]
    fn ray_misses_box_off_axis() {
        let from = Vec3::new(5.0, -5.0, 0.0);
        let to = Vec3::new(5.0, 30.0, 0.0);
        let ray = RayCast::new(from, to);
        let bounds = [Vec3::new(-1.0, 0.0, -1.0), Vec3::new(1.0, 1.0, 1.0)];
        assert!(
            ray_slab_hit(from, ray.direction_inverse, ray.signs, &bounds, 0.0, ray.lambda_max)
                .is_none()
        );
    }

    #[test]
    fn hit_beyond_segment_is_rejected() {
        let from = Vec3::new(0.0, 0.0, 0.0);
        let to = Vec3::new(2.0, 0.0, 0.0);
        let ray = RayCast::new(from, to);
        let bounds = [Vec3::new(5.0, -1.0, -1.0), Vec3::new(6.0, 1.0, 1.0)];
        assert!(
            ray_slab_hit(from, ray.direction_inverse, ray.signs, &bounds, 0.0, ray.lambda_max)
                .is_none()
        );
    }

    #[test]
    fn negative_direction_uses_sign_bits() {
        let from = Vec3::new(0.0, 10.0, 0.0);
        let to = Vec3::new(0.0, -10.0, 0.0);
        let ray = RayCast::new(from, to);
        assert_eq!(ray.signs, [0, 1, 0]);
        let bounds = [Vec3::new(-1.0, -1.0, -1.0), Vec3::new(1.0, 1.0, 1.0)];
        assert!(
            ray_slab_hit(from, ray.direction_inverse, ray.signs, &bounds, 0.0, ray.lambda_max)
                .is_some()
        );
    }
}
