// Copyright 2025 the Bracken Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Bracken Broadphase: maintain the set of AABB-overlapping object pairs for
//! a moving population, and answer ray and box queries against it.
//!
//! A broad-phase is the coarse filter of a collision pipeline: it tracks a
//! *proxy* per collidable object (an AABB plus filter bits and a payload) and
//! keeps an [overlapping pair cache](bracken_pairs) current as proxies move.
//! The precise narrow-phase work on those pairs belongs to an external
//! dispatcher; this crate only produces the pair set.
//!
//! Two backends implement the common [`BroadPhase`] trait:
//!
//! - [`backends::AxisSweep`]: incremental sweep-and-prune over three sorted
//!   edge arrays of integer-quantized coordinates. Excellent for coherent
//!   motion inside a known world box; handle capacity is fixed up front.
//!   Comes in 16-bit ([`backends::AxisSweep16`], up to ~32k proxies) and
//!   32-bit ([`backends::AxisSweep32`]) quantization widths, and can embed a
//!   [`backends::DbvtBroadPhase`] purely as a ray-cast accelerator.
//! - [`backends::DbvtBroadPhase`]: two dynamic bounding volume trees
//!   ([`bracken_dbvt`]), one for moving proxies and one for proxies that
//!   have held still long enough to be staged out. Unbounded world, no
//!   handle cap, velocity-predictive fattening to skip redundant updates.
//!
//! The pair cache implementation is a type parameter on both backends
//! (default [`HashedPairCache`](bracken_pairs::HashedPairCache)), the same
//! way a spatial index picks its backend in a tree type.
//!
//! # Concurrency
//!
//! A single instance is not internally parallel: callers serialize mutators.
//! `ray_test`/`aabb_test` are `&self` and re-entrant; heavy ray users can
//! avoid per-call allocation with
//! [`backends::DbvtBroadPhase::ray_test_with_stack`] and a
//! [`RayStackPool`] sized to their worker count. Fanning narrow-phase work
//! out over the produced pairs goes through
//! [`dispatch_pairs`] and a [`bracken_tasks::TaskScheduler`].
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

pub mod backends;
mod interface;
mod quantize;

pub use bracken_geom::{Aabb3, RayCast, Vec3};
pub use interface::{AabbCallback, BroadPhase, RayCallback, RayStackPool, dispatch_pairs};
pub use quantize::{Quantizer, SweepInt};
