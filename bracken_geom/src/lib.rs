// Copyright 2025 the Bracken Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Bracken Geom: primitive 3D types shared by the Bracken broad-phase crates.
//!
//! This crate is deliberately tiny. It provides:
//!
//! - [`Vec3`]: a plain `f32` 3-vector with the handful of operations the
//!   broad-phase needs (no swizzles, no SIMD).
//! - [`Aabb3`]: an axis-aligned box with the union/containment/expansion
//!   operations a refit-friendly bounding volume tree relies on.
//! - [`RayCast`] and [`ray_slab_hit`]: the precomputed-reciprocal slab test
//!   used to walk bounding volume hierarchies without re-deriving per-node
//!   ray state.
//!
//! Float inputs are assumed to be finite (no NaNs). Debug builds may assert.
//!
//! This crate is `no_std` and uses `alloc`-free code only.

#![no_std]

mod aabb;
mod ray;
mod vec3;

pub use aabb::Aabb3;
pub use ray::{RayCast, ray_slab_hit};
pub use vec3::Vec3;
