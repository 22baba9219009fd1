// Copyright 2025 the Bracken Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Broad-phase backend implementations.
//!
//! - `axis_sweep`: incremental sweep-and-prune over sorted integer edge
//!   arrays. Fixed handle capacity, known world box, best for coherent
//!   motion.
//! - `dbvt_phase`: two dynamic bounding volume trees with a staging scheme
//!   that migrates resting proxies out of the hot set. Unbounded world.
//!
//! Picking between them
//! --------------------
//! Sweep-and-prune pays a near-zero cost for proxies that do not move and a
//! small incremental cost per moved edge, but quantizes into a fixed world
//! box and caps its population up front. The tree backend has no caps and
//! absorbs teleports gracefully, at the price of per-update tree work and a
//! periodic cleanup sweep. The sweep backend can embed a tree instance
//! purely as its ray accelerator, which is the configuration game worlds
//! usually want.

pub mod axis_sweep;
pub mod dbvt_phase;

pub use axis_sweep::{AxisSweep, AxisSweep16, AxisSweep32};
pub use dbvt_phase::DbvtBroadPhase;
