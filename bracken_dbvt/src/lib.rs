// Copyright 2025 the Bracken Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Bracken DBVT: a dynamic bounding volume tree tuned for frequent leaf
//! updates.
//!
//! The tree is a proper binary hierarchy of [`Aabb3`] volumes: every internal
//! node has exactly two children and a volume enclosing both. Leaves carry an
//! opaque `u32` payload (typically a broad-phase proxy slot). Unlike a
//! build-once BVH, the structure is designed around mutation:
//!
//! - [`Dbvt::insert`] descends by least surface-area growth and refits only
//!   the ancestors whose volumes actually changed.
//! - [`Dbvt::update_with_velocity`] skips work entirely while a fattened leaf
//!   volume still covers the new box, and reinserts near the old position
//!   otherwise.
//! - [`Dbvt::optimize_incremental`] amortizes rebalancing across frames by
//!   rotating nodes along a path chosen from the low bits of an internal
//!   counter; [`Dbvt::optimize_top_down`] does a full median-split rebuild
//!   when a one-off cost is acceptable.
//!
//! Nodes live in an arena ([`NodeIndex`] handles, 32-bit); ids are stable
//! across tree mutations, so owners may store leaf ids in their proxies. A
//! one-slot free cache absorbs the delete-then-insert pattern every update
//! produces.
//!
//! Queries ([`Dbvt::collide_tt`], [`Dbvt::collide_tv`],
//! [`Dbvt::ray_test_internal`]) are iterative with explicit stacks. Tree-tree
//! collision takes its stack from the caller so one persistent buffer can
//! stay warm across frames; the ray test takes one for re-entrancy.
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

mod node;
mod query;
mod tree;

pub use bracken_geom::{Aabb3, RayCast, Vec3};
pub use node::NodeIndex;
pub use query::TreeWriter;
pub use tree::Dbvt;
