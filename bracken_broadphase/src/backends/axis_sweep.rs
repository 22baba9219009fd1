// Copyright 2025 the Bracken Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Incremental sweep-and-prune over three sorted edge arrays.

use alloc::vec::Vec;

use bracken_geom::{Aabb3, RayCast, Vec3};
use bracken_pairs::{
    Dispatcher, FilterGroups, HashedPairCache, NullPairCache, Pair, PairCache, PairTarget,
    ProxyId,
};

use crate::backends::dbvt_phase::DbvtBroadPhase;
use crate::interface::{AabbCallback, BroadPhase, RayCallback};
use crate::quantize::{Quantizer, SweepInt};

/// One endpoint of a projected interval: a quantized position whose bit 0
/// carries the min/max parity, and the owning handle's slot.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct Edge<I> {
    position: I,
    handle: I,
}

impl<I: SweepInt> Edge<I> {
    #[inline]
    fn is_max(&self) -> bool {
        self.position.to_usize() & 1 == 1
    }
}

#[derive(Clone, Debug)]
struct Handle<P, I> {
    aabb: Aabb3,
    payload: Option<P>,
    group: FilterGroups,
    mask: FilterGroups,
    /// Per-axis index of this handle's min edge. Slot 0 doubles as the
    /// free-list link while the handle is unallocated.
    min_edges: [I; 3],
    max_edges: [I; 3],
    accel_proxy: Option<ProxyId>,
}

impl<P, I: SweepInt> Handle<P, I> {
    fn vacant() -> Self {
        Self {
            aabb: Aabb3::default(),
            payload: None,
            group: FilterGroups::empty(),
            mask: FilterGroups::empty(),
            min_edges: [I::ZERO; 3],
            max_edges: [I::ZERO; 3],
            accel_proxy: None,
        }
    }

    #[inline]
    fn next_free(&self) -> usize {
        self.min_edges[0].to_usize()
    }

    #[inline]
    fn set_next_free(&mut self, next: usize) {
        self.min_edges[0] = I::from_usize(next);
    }
}

/// Strict float overlap on every axis: face-touching boxes do not count.
/// The add side of the sweep uses this, so the pair set never picks up
/// contacts that are only shared faces.
fn strict_overlap<P, I>(handles: &[Handle<P, I>], a: usize, b: usize) -> bool {
    let (ba, bb) = (&handles[a].aabb, &handles[b].aabb);
    ba.min.x < bb.max.x
        && bb.min.x < ba.max.x
        && ba.min.y < bb.max.y
        && bb.min.y < ba.max.y
        && ba.min.z < bb.max.z
        && bb.min.z < ba.max.z
}

/// Sweep-and-prune broad-phase.
///
/// Each axis keeps every proxy's projected interval endpoints in a sorted
/// array, bracketed by sentinel edges at the quantized world floor and
/// ceiling. Moving a proxy bubbles its four changed edges toward their new
/// positions; each swap against a neighbour edge is exactly the moment one
/// axis's interval relationship flips, so a 2D check of the remaining axes
/// is enough to add or remove the pair. Cost per update is proportional to
/// how far the edges travel, which is what makes the scheme incremental.
///
/// Coordinates are quantized to `I` ([`SweepInt`]): [`AxisSweep16`] for
/// worlds up to ~32k proxies, [`AxisSweep32`] beyond that. Construction
/// fixes the world box and the handle capacity;
/// [`AxisSweep::create_proxy`][BroadPhase::create_proxy] returns `None` once
/// the capacity is exhausted.
///
/// Ray and box queries either walk the axis-0 edge list (correct but
/// linear) or, by default, delegate to an embedded [`DbvtBroadPhase`] kept
/// alive purely as a ray accelerator behind a no-op pair cache.
pub struct AxisSweep<P, I: SweepInt = u16, C: PairCache = HashedPairCache> {
    quantizer: Quantizer<I>,
    handles: Vec<Handle<P, I>>,
    edges: [Vec<Edge<I>>; 3],
    handle_count: usize,
    first_free: usize,
    pair_cache: C,
    invalid_pair_count: usize,
    accelerator: Option<DbvtBroadPhase<P, NullPairCache>>,
}

/// 16-bit sweep-and-prune (up to ~32k handles).
pub type AxisSweep16<P, C = HashedPairCache> = AxisSweep<P, u16, C>;
/// 32-bit sweep-and-prune for very large worlds.
pub type AxisSweep32<P, C = HashedPairCache> = AxisSweep<P, u32, C>;

impl<P, I: SweepInt, C: PairCache> core::fmt::Debug for AxisSweep<P, I, C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AxisSweep")
            .field("handles", &self.handle_count)
            .field("capacity", &(self.handles.len() - 1))
            .field("pairs", &self.pair_cache.len())
            .field("ray_accelerator", &self.accelerator.is_some())
            .finish_non_exhaustive()
    }
}

impl<P: Copy, I: SweepInt> AxisSweep<P, I, HashedPairCache> {
    /// Sweep over `world` with the default hashed pair cache and an embedded
    /// ray accelerator.
    pub fn new(world: Aabb3, max_handles: usize) -> Self {
        Self::with_pair_cache(world, max_handles, HashedPairCache::new(), true)
    }
}

impl<P: Copy, I: SweepInt, C: PairCache> AxisSweep<P, I, C> {
    /// Full-control constructor: explicit pair cache, optional ray
    /// accelerator.
    pub fn with_pair_cache(
        world: Aabb3,
        max_handles: usize,
        pair_cache: C,
        ray_accelerator: bool,
    ) -> Self {
        debug_assert!(
            max_handles >= 1 && max_handles <= I::MAX_HANDLES,
            "handle capacity out of range for the edge coordinate width"
        );
        let capacity = max_handles + 1; // slot 0 is the sentinel handle
        let mut handles = Vec::with_capacity(capacity);
        handles.resize_with(capacity, Handle::vacant);
        for i in 1..capacity {
            let next = if i + 1 < capacity { i + 1 } else { 0 };
            handles[i].set_next_free(next);
        }
        handles[0].max_edges = [I::ONE; 3];

        let empty = Edge {
            position: I::ZERO,
            handle: I::ZERO,
        };
        let mut edges = [
            alloc::vec![empty; capacity * 2],
            alloc::vec![empty; capacity * 2],
            alloc::vec![empty; capacity * 2],
        ];
        for axis_edges in &mut edges {
            axis_edges[1] = Edge {
                position: I::SENTINEL,
                handle: I::ZERO,
            };
        }

        let accelerator = if ray_accelerator {
            let mut accel = DbvtBroadPhase::new(NullPairCache::new());
            accel.deferred_collide = true;
            Some(accel)
        } else {
            None
        };

        Self {
            quantizer: Quantizer::new(world),
            handles,
            edges,
            handle_count: 0,
            first_free: 1,
            pair_cache,
            invalid_pair_count: 0,
            accelerator,
        }
    }

    /// Live handle count.
    pub fn handle_count(&self) -> usize {
        self.handle_count
    }

    /// The quantization map in use.
    pub fn quantizer(&self) -> &Quantizer<I> {
        &self.quantizer
    }

    fn target(&self, handle: usize) -> PairTarget {
        let h = &self.handles[handle];
        PairTarget::new(ProxyId::new(handle as u32), h.group, h.mask)
    }

    /// Interval overlap on the two axes other than `axis`, by edge index.
    /// Index comparison is exact here: the arrays are sorted, so interval
    /// containment reduces to the endpoints' relative order.
    fn test_overlap_2d(&self, a: usize, b: usize, axis: usize) -> bool {
        let axis1 = (1 << axis) & 3;
        let axis2 = (1 << axis1) & 3;
        let (ha, hb) = (&self.handles[a], &self.handles[b]);
        !(ha.max_edges[axis1] < hb.min_edges[axis1]
            || hb.max_edges[axis1] < ha.min_edges[axis1]
            || ha.max_edges[axis2] < hb.min_edges[axis2]
            || hb.max_edges[axis2] < ha.min_edges[axis2])
    }

    // The four sort primitives. Each bubbles one edge toward its sorted
    // position; every swap is one interval endpoint passing another, which
    // is where pairs are born and die. Down-moves of a min and up-moves of
    // a max can only create overlap; the other two can only destroy it.

    fn sort_min_down(&mut self, axis: usize, edge: usize, update_overlaps: bool) {
        let mut edge_idx = edge;
        loop {
            let prev_idx = edge_idx - 1;
            let current = self.edges[axis][edge_idx];
            let prev = self.edges[axis][prev_idx];
            if current.position >= prev.position {
                break;
            }
            let edge_handle = current.handle.to_usize();
            let prev_handle = prev.handle.to_usize();
            if prev.is_max() {
                if update_overlaps && strict_overlap(&self.handles, edge_handle, prev_handle) {
                    let (a, b) = (self.target(edge_handle), self.target(prev_handle));
                    self.pair_cache.add_pair(a, b);
                }
                let m = &mut self.handles[prev_handle].max_edges[axis];
                *m = *m + I::ONE;
            } else {
                let m = &mut self.handles[prev_handle].min_edges[axis];
                *m = *m + I::ONE;
            }
            let m = &mut self.handles[edge_handle].min_edges[axis];
            *m = *m - I::ONE;
            self.edges[axis].swap(edge_idx, prev_idx);
            edge_idx = prev_idx;
        }
    }

    fn sort_min_up(
        &mut self,
        axis: usize,
        edge: usize,
        dispatcher: &mut dyn Dispatcher,
        update_overlaps: bool,
    ) {
        let mut edge_idx = edge;
        loop {
            let next_idx = edge_idx + 1;
            let current = self.edges[axis][edge_idx];
            let next = self.edges[axis][next_idx];
            if next.handle == I::ZERO || current.position < next.position {
                break;
            }
            let edge_handle = current.handle.to_usize();
            let next_handle = next.handle.to_usize();
            if next.is_max() {
                if update_overlaps && self.test_overlap_2d(edge_handle, next_handle, axis) {
                    self.pair_cache.remove_pair(
                        ProxyId::new(edge_handle as u32),
                        ProxyId::new(next_handle as u32),
                        dispatcher,
                    );
                }
                let m = &mut self.handles[next_handle].max_edges[axis];
                *m = *m - I::ONE;
            } else {
                let m = &mut self.handles[next_handle].min_edges[axis];
                *m = *m - I::ONE;
            }
            let m = &mut self.handles[edge_handle].min_edges[axis];
            *m = *m + I::ONE;
            self.edges[axis].swap(edge_idx, next_idx);
            edge_idx = next_idx;
        }
    }

    fn sort_max_down(
        &mut self,
        axis: usize,
        edge: usize,
        dispatcher: &mut dyn Dispatcher,
        update_overlaps: bool,
    ) {
        let mut edge_idx = edge;
        loop {
            let prev_idx = edge_idx - 1;
            let current = self.edges[axis][edge_idx];
            let prev = self.edges[axis][prev_idx];
            if current.position >= prev.position {
                break;
            }
            let edge_handle = current.handle.to_usize();
            let prev_handle = prev.handle.to_usize();
            if !prev.is_max() {
                if update_overlaps && self.test_overlap_2d(edge_handle, prev_handle, axis) {
                    self.pair_cache.remove_pair(
                        ProxyId::new(edge_handle as u32),
                        ProxyId::new(prev_handle as u32),
                        dispatcher,
                    );
                }
                let m = &mut self.handles[prev_handle].min_edges[axis];
                *m = *m + I::ONE;
            } else {
                let m = &mut self.handles[prev_handle].max_edges[axis];
                *m = *m + I::ONE;
            }
            let m = &mut self.handles[edge_handle].max_edges[axis];
            *m = *m - I::ONE;
            self.edges[axis].swap(edge_idx, prev_idx);
            edge_idx = prev_idx;
        }
    }

    fn sort_max_up(&mut self, axis: usize, edge: usize, update_overlaps: bool) {
        let mut edge_idx = edge;
        loop {
            let next_idx = edge_idx + 1;
            let current = self.edges[axis][edge_idx];
            let next = self.edges[axis][next_idx];
            if next.handle == I::ZERO || current.position < next.position {
                break;
            }
            let edge_handle = current.handle.to_usize();
            let next_handle = next.handle.to_usize();
            if !next.is_max() {
                if update_overlaps && strict_overlap(&self.handles, edge_handle, next_handle) {
                    let (a, b) = (self.target(edge_handle), self.target(next_handle));
                    self.pair_cache.add_pair(a, b);
                }
                let m = &mut self.handles[next_handle].min_edges[axis];
                *m = *m - I::ONE;
            } else {
                let m = &mut self.handles[next_handle].max_edges[axis];
                *m = *m - I::ONE;
            }
            let m = &mut self.handles[edge_handle].max_edges[axis];
            *m = *m + I::ONE;
            self.edges[axis].swap(edge_idx, next_idx);
            edge_idx = next_idx;
        }
    }

    fn add_handle(
        &mut self,
        aabb: Aabb3,
        payload: P,
        group: FilterGroups,
        mask: FilterGroups,
        dispatcher: &mut dyn Dispatcher,
    ) -> Option<usize> {
        if self.first_free == 0 {
            return None;
        }
        let min = self.quantizer.quantize(aabb.min, false);
        let max = self.quantizer.quantize(aabb.max, true);

        let handle = self.first_free;
        self.first_free = self.handles[handle].next_free();
        self.handle_count += 1;

        self.handles[handle] = Handle {
            aabb,
            payload: Some(payload),
            group,
            mask,
            min_edges: [I::ZERO; 3],
            max_edges: [I::ZERO; 3],
            accel_proxy: None,
        };

        // Insert the new edges just inside the sentinel ceiling, then bubble
        // them left. Only the final axis reports overlaps: no pair can be a
        // true 3-axis overlap until all three axes have settled.
        let limit = self.handle_count * 2;
        let two = I::ONE + I::ONE;
        for axis in 0..3 {
            self.handles[0].max_edges[axis] = self.handles[0].max_edges[axis] + two;
            self.edges[axis][limit + 1] = self.edges[axis][limit - 1];
            self.edges[axis][limit - 1] = Edge {
                position: min[axis],
                handle: I::from_usize(handle),
            };
            self.edges[axis][limit] = Edge {
                position: max[axis],
                handle: I::from_usize(handle),
            };
            self.handles[handle].min_edges[axis] = I::from_usize(limit - 1);
            self.handles[handle].max_edges[axis] = I::from_usize(limit);
        }

        // Bubble the new edges into place. Only the min edge of the last
        // axis reports: its crossings are the one moment a full-height
        // overlap test is run exactly once per candidate, and the max
        // settle cannot invalidate anything that test admitted.
        for axis in 0..3 {
            let report = axis == 2;
            let min_edge = self.handles[handle].min_edges[axis].to_usize();
            self.sort_min_down(axis, min_edge, report);
            let max_edge = self.handles[handle].max_edges[axis].to_usize();
            self.sort_max_down(axis, max_edge, dispatcher, false);
        }
        Some(handle)
    }

    fn update_handle(
        &mut self,
        handle: usize,
        aabb: Aabb3,
        dispatcher: &mut dyn Dispatcher,
    ) {
        let min = self.quantizer.quantize(aabb.min, false);
        let max = self.quantizer.quantize(aabb.max, true);
        self.handles[handle].aabb = aabb;

        for axis in 0..3 {
            let emin = self.handles[handle].min_edges[axis].to_usize();
            let emax = self.handles[handle].max_edges[axis].to_usize();
            let dmin =
                min[axis].to_usize() as i64 - self.edges[axis][emin].position.to_usize() as i64;
            let dmax =
                max[axis].to_usize() as i64 - self.edges[axis][emax].position.to_usize() as i64;
            self.edges[axis][emin].position = min[axis];
            self.edges[axis][emax].position = max[axis];

            // Expansion first (can only add overlaps), then shrink (can
            // only remove them).
            if dmin < 0 {
                self.sort_min_down(axis, emin, true);
            }
            if dmax > 0 {
                let emax = self.handles[handle].max_edges[axis].to_usize();
                self.sort_max_up(axis, emax, true);
            }
            if dmin > 0 {
                let emin = self.handles[handle].min_edges[axis].to_usize();
                self.sort_min_up(axis, emin, dispatcher, true);
            }
            if dmax < 0 {
                let emax = self.handles[handle].max_edges[axis].to_usize();
                self.sort_max_down(axis, emax, dispatcher, true);
            }
        }
    }

    fn remove_handle(&mut self, handle: usize, dispatcher: &mut dyn Dispatcher) {
        // Strip the handle's pairs before its slot can be recycled; a stale
        // pair surviving into a reused slot would alias a different proxy.
        self.pair_cache
            .remove_pairs_containing(ProxyId::new(handle as u32), dispatcher);

        let limit = self.handle_count * 2;
        let two = I::ONE + I::ONE;
        for axis in 0..3 {
            self.handles[0].max_edges[axis] = self.handles[0].max_edges[axis] - two;
        }
        // Evict both edges by pushing them to the sentinel ceiling; the
        // surviving edges slide back into place as they pass.
        for axis in 0..3 {
            let emax = self.handles[handle].max_edges[axis].to_usize();
            self.edges[axis][emax].position = I::SENTINEL;
            self.sort_max_up(axis, emax, false);

            let emin = self.handles[handle].min_edges[axis].to_usize();
            self.edges[axis][emin].position = I::SENTINEL;
            self.sort_min_up(axis, emin, dispatcher, false);

            self.edges[axis][limit - 1] = Edge {
                position: I::SENTINEL,
                handle: I::ZERO,
            };
        }

        self.handles[handle].payload = None;
        self.handles[handle].accel_proxy = None;
        self.handles[handle].set_next_free(self.first_free);
        self.first_free = handle;
        self.handle_count -= 1;
    }
}

impl<P: Copy, I: SweepInt, C: PairCache> BroadPhase<P> for AxisSweep<P, I, C> {
    type Cache = C;

    fn create_proxy(
        &mut self,
        aabb_min: Vec3,
        aabb_max: Vec3,
        payload: P,
        group: FilterGroups,
        mask: FilterGroups,
        dispatcher: &mut dyn Dispatcher,
    ) -> Option<ProxyId> {
        let aabb = Aabb3::new(aabb_min, aabb_max);
        let handle = self.add_handle(aabb, payload, group, mask, dispatcher)?;
        if let Some(accel) = self.accelerator.as_mut() {
            let accel_proxy =
                accel.create_proxy(aabb_min, aabb_max, payload, group, mask, dispatcher);
            self.handles[handle].accel_proxy = accel_proxy;
        }
        Some(ProxyId::new(handle as u32))
    }

    fn destroy_proxy(&mut self, proxy: ProxyId, dispatcher: &mut dyn Dispatcher) {
        let handle = proxy.raw() as usize;
        if let (Some(accel), Some(accel_proxy)) =
            (self.accelerator.as_mut(), self.handles[handle].accel_proxy)
        {
            accel.destroy_proxy(accel_proxy, dispatcher);
        }
        self.remove_handle(handle, dispatcher);
    }

    fn set_aabb(
        &mut self,
        proxy: ProxyId,
        aabb_min: Vec3,
        aabb_max: Vec3,
        dispatcher: &mut dyn Dispatcher,
    ) {
        let handle = proxy.raw() as usize;
        let aabb = Aabb3::new(aabb_min, aabb_max);
        self.update_handle(handle, aabb, dispatcher);
        if let (Some(accel), Some(accel_proxy)) =
            (self.accelerator.as_mut(), self.handles[handle].accel_proxy)
        {
            accel.set_aabb(accel_proxy, aabb_min, aabb_max, dispatcher);
        }
    }

    fn aabb(&self, proxy: ProxyId) -> Aabb3 {
        let handle = &self.handles[proxy.raw() as usize];
        debug_assert!(handle.payload.is_some(), "aabb of a freed handle");
        handle.aabb
    }

    fn ray_test(
        &self,
        from: Vec3,
        to: Vec3,
        callback: &mut dyn RayCallback<P>,
        clip_min: Vec3,
        clip_max: Vec3,
    ) {
        if let Some(accel) = self.accelerator.as_ref() {
            accel.ray_test(from, to, callback, clip_min, clip_max);
            return;
        }
        // Correctness fallback: every live handle appears exactly once as a
        // max edge on axis 0.
        let mut ray = RayCast::new(from, to);
        for i in 1..=self.handle_count * 2 {
            let edge = self.edges[0][i];
            if edge.is_max() {
                let slot = edge.handle.to_usize();
                let handle = &self.handles[slot];
                let payload = handle
                    .payload
                    .as_ref()
                    .expect("edge invariant violated: edge references freed handle");
                if callback.process(ProxyId::new(slot as u32), payload, &mut ray) {
                    return;
                }
            }
        }
    }

    fn aabb_test(&self, aabb_min: Vec3, aabb_max: Vec3, callback: &mut dyn AabbCallback<P>) {
        if let Some(accel) = self.accelerator.as_ref() {
            accel.aabb_test(aabb_min, aabb_max, callback);
            return;
        }
        let query = Aabb3::new(aabb_min, aabb_max);
        for i in 1..=self.handle_count * 2 {
            let edge = self.edges[0][i];
            if edge.is_max() {
                let slot = edge.handle.to_usize();
                let handle = &self.handles[slot];
                if !query.overlaps(&handle.aabb) {
                    continue;
                }
                let payload = handle
                    .payload
                    .as_ref()
                    .expect("edge invariant violated: edge references freed handle");
                if callback.process(ProxyId::new(slot as u32), payload) {
                    return;
                }
            }
        }
    }

    fn calculate_overlapping_pairs(&mut self, dispatcher: &mut dyn Dispatcher) {
        if !self.pair_cache.has_deferred_removal() {
            // The edge sorts keep a hashed cache live on their own.
            return;
        }
        let handles = &self.handles;
        let raw = self.pair_cache.raw_pairs_mut();

        // First sort collocates duplicates and pushes slots already marked
        // dead (sentinel ids) to the tail.
        raw.sort_unstable_by_key(Pair::key);
        let live = raw.len() - self.invalid_pair_count;
        raw.truncate(live);
        self.invalid_pair_count = 0;

        let mut invalid = 0usize;
        let mut previous: Option<(ProxyId, ProxyId)> = None;
        for pair in raw.iter_mut() {
            let duplicate = previous == Some(pair.key());
            previous = Some(pair.key());
            let needs_removal = if duplicate {
                debug_assert!(pair.algorithm.is_none(), "duplicate pair owns narrow-phase state");
                true
            } else {
                let a = pair.proxy0.id.raw() as usize;
                let b = pair.proxy1.id.raw() as usize;
                !strict_overlap(handles, a, b)
            };
            if needs_removal {
                pair.release_algorithm(dispatcher);
                pair.invalidate();
                invalid += 1;
            }
        }

        raw.sort_unstable_by_key(Pair::key);
        let live = raw.len() - invalid;
        raw.truncate(live);
    }

    fn pair_cache(&self) -> &C {
        &self.pair_cache
    }

    fn pair_cache_mut(&mut self) -> &mut C {
        &mut self.pair_cache
    }

    fn world_bounds(&self) -> Aabb3 {
        self.quantizer.world()
    }

    fn reset_pool(&mut self, _dispatcher: &mut dyn Dispatcher) {
        if self.handle_count != 0 {
            return;
        }
        let capacity = self.handles.len();
        self.first_free = 1;
        for i in 1..capacity {
            let next = if i + 1 < capacity { i + 1 } else { 0 };
            self.handles[i].set_next_free(next);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AxisSweep, AxisSweep16, AxisSweep32, Edge};
    use crate::interface::{AabbCallback, BroadPhase, RayCallback};
    use crate::quantize::SweepInt;
    use alloc::vec::Vec;
    use bracken_geom::{Aabb3, RayCast, Vec3};
    use bracken_pairs::{
        FilterGroups, NullDispatcher, PairCache, ProxyId, SortedPairCache,
    };

    fn v(x: f32, y: f32, z: f32) -> Vec3 {
        Vec3::new(x, y, z)
    }

    fn world() -> Aabb3 {
        Aabb3::new(Vec3::splat(-100.0), Vec3::splat(100.0))
    }

    fn sweep(max_handles: usize) -> AxisSweep16<u32> {
        AxisSweep::new(world(), max_handles)
    }

    fn add(
        bp: &mut impl BroadPhase<u32>,
        dispatcher: &mut NullDispatcher,
        min: Vec3,
        max: Vec3,
        tag: u32,
    ) -> ProxyId {
        bp.create_proxy(min, max, tag, FilterGroups::DEFAULT, FilterGroups::ALL, dispatcher)
            .expect("capacity")
    }

    /// Every edge array must stay sorted non-decreasingly, and every live
    /// handle's stored indices must point back at its own edges.
    fn check_edge_invariants<I: SweepInt>(bp: &AxisSweep<u32, I>) {
        for axis in 0..3 {
            let used = bp.handle_count * 2 + 2;
            let edges = &bp.edges[axis];
            for i in 1..used {
                assert!(
                    edges[i - 1].position <= edges[i].position,
                    "axis {axis} unsorted at {i}"
                );
            }
        }
        for slot in 1..bp.handles.len() {
            let handle = &bp.handles[slot];
            if handle.payload.is_none() {
                continue;
            }
            for axis in 0..3 {
                let emin = handle.min_edges[axis].to_usize();
                let emax = handle.max_edges[axis].to_usize();
                assert!(emin < emax, "min edge right of max edge");
                assert_eq!(bp.edges[axis][emin].handle.to_usize(), slot);
                assert_eq!(bp.edges[axis][emax].handle.to_usize(), slot);
                assert!(!bp.edges[axis][emin].is_max(), "min edge carries max parity");
                assert!(bp.edges[axis][emax].is_max(), "max edge lost its parity");
            }
        }
    }

    #[test]
    fn two_boxes_diverging() {
        let mut dispatcher = NullDispatcher;
        let mut bp = sweep(16);

        let _a = add(&mut bp, &mut dispatcher, v(0.0, 0.0, 0.0), v(10.0, 10.0, 10.0), 0);
        let b = add(&mut bp, &mut dispatcher, v(5.0, 5.0, 5.0), v(15.0, 15.0, 15.0), 1);
        check_edge_invariants(&bp);
        bp.calculate_overlapping_pairs(&mut dispatcher);
        assert_eq!(bp.pair_cache().len(), 1);

        bp.set_aabb(b, v(20.0, 5.0, 5.0), v(30.0, 15.0, 15.0), &mut dispatcher);
        check_edge_invariants(&bp);
        bp.calculate_overlapping_pairs(&mut dispatcher);
        assert_eq!(bp.pair_cache().len(), 0);
    }

    #[test]
    fn face_touching_boxes_produce_no_pair() {
        let mut dispatcher = NullDispatcher;
        let mut bp = sweep(16);
        let _a = add(&mut bp, &mut dispatcher, v(0.0, 0.0, 0.0), v(10.0, 10.0, 10.0), 0);
        let _b = add(&mut bp, &mut dispatcher, v(10.0, 0.0, 0.0), v(20.0, 10.0, 10.0), 1);
        check_edge_invariants(&bp);
        bp.calculate_overlapping_pairs(&mut dispatcher);
        assert_eq!(bp.pair_cache().len(), 0, "shared faces are not overlap");
    }

    /// The live edge region: both sentinels plus every handle edge. Slots
    /// past the ceiling sentinel are scratch and carry no state.
    fn active_edges(bp: &AxisSweep16<u32>) -> [Vec<Edge<u16>>; 3] {
        let used = bp.handle_count * 2 + 2;
        [
            bp.edges[0][..used].to_vec(),
            bp.edges[1][..used].to_vec(),
            bp.edges[2][..used].to_vec(),
        ]
    }

    #[test]
    fn add_remove_restores_edge_arrays() {
        let mut dispatcher = NullDispatcher;
        let mut bp = sweep(16);
        let _a = add(&mut bp, &mut dispatcher, v(-5.0, -5.0, -5.0), v(5.0, 5.0, 5.0), 0);

        let snapshot = active_edges(&bp);
        let free_before = bp.first_free;

        let b = add(&mut bp, &mut dispatcher, v(0.0, 0.0, 0.0), v(3.0, 3.0, 3.0), 1);
        assert_eq!(bp.pair_cache().len(), 1);
        bp.destroy_proxy(b, &mut dispatcher);

        assert_eq!(active_edges(&bp), snapshot, "insert-then-remove must restore the arrays");
        assert_eq!(bp.first_free, free_before);
        assert_eq!(bp.pair_cache().len(), 0);
        check_edge_invariants(&bp);
    }

    #[test]
    fn capacity_exhaustion_returns_none() {
        let mut dispatcher = NullDispatcher;
        let mut bp = sweep(2);
        for i in 0..2 {
            let f = i as f32 * 20.0;
            assert!(
                bp.create_proxy(
                    v(f, 0.0, 0.0),
                    v(f + 1.0, 1.0, 1.0),
                    i,
                    FilterGroups::DEFAULT,
                    FilterGroups::ALL,
                    &mut dispatcher,
                )
                .is_some()
            );
        }
        assert!(
            bp.create_proxy(
                v(50.0, 0.0, 0.0),
                v(51.0, 1.0, 1.0),
                9,
                FilterGroups::DEFAULT,
                FilterGroups::ALL,
                &mut dispatcher,
            )
            .is_none(),
            "third proxy exceeds the constructed capacity"
        );
        assert_eq!(bp.handle_count(), 2);
    }

    #[test]
    fn freed_handles_recycle_lifo() {
        let mut dispatcher = NullDispatcher;
        let mut bp = sweep(8);
        let a = add(&mut bp, &mut dispatcher, v(0.0, 0.0, 0.0), v(1.0, 1.0, 1.0), 0);
        bp.destroy_proxy(a, &mut dispatcher);
        let b = add(&mut bp, &mut dispatcher, v(4.0, 0.0, 0.0), v(5.0, 1.0, 1.0), 1);
        assert_eq!(a, b, "freelist hands back the last freed slot");
    }

    #[test]
    fn growing_and_shrinking_tracks_pairs() {
        let mut dispatcher = NullDispatcher;
        let mut bp = sweep(16);
        let a = add(&mut bp, &mut dispatcher, v(0.0, 0.0, 0.0), v(2.0, 2.0, 2.0), 0);
        let _b = add(&mut bp, &mut dispatcher, v(6.0, 0.0, 0.0), v(8.0, 2.0, 2.0), 1);
        assert_eq!(bp.pair_cache().len(), 0);

        // Grow a over b.
        bp.set_aabb(a, v(0.0, 0.0, 0.0), v(7.0, 2.0, 2.0), &mut dispatcher);
        check_edge_invariants(&bp);
        assert_eq!(bp.pair_cache().len(), 1);

        // Shrink it back.
        bp.set_aabb(a, v(0.0, 0.0, 0.0), v(2.0, 2.0, 2.0), &mut dispatcher);
        check_edge_invariants(&bp);
        assert_eq!(bp.pair_cache().len(), 0);
    }

    #[test]
    fn set_aabb_with_equal_box_changes_nothing() {
        let mut dispatcher = NullDispatcher;
        let mut bp = sweep(16);
        let a = add(&mut bp, &mut dispatcher, v(0.0, 0.0, 0.0), v(4.0, 4.0, 4.0), 0);
        let _b = add(&mut bp, &mut dispatcher, v(2.0, 2.0, 2.0), v(6.0, 6.0, 6.0), 1);
        let snapshot = bp.edges.clone();
        bp.set_aabb(a, v(0.0, 0.0, 0.0), v(4.0, 4.0, 4.0), &mut dispatcher);
        assert_eq!(bp.edges, snapshot);
        assert_eq!(bp.pair_cache().len(), 1);
    }

    #[test]
    fn filter_masks_suppress_pairs() {
        let mut dispatcher = NullDispatcher;
        let mut bp = sweep(16);
        bp.create_proxy(
            v(0.0, 0.0, 0.0),
            v(4.0, 4.0, 4.0),
            0,
            FilterGroups::DEBRIS,
            FilterGroups::DEFAULT,
            &mut dispatcher,
        )
        .unwrap();
        bp.create_proxy(
            v(1.0, 1.0, 1.0),
            v(5.0, 5.0, 5.0),
            1,
            FilterGroups::DEBRIS,
            FilterGroups::DEFAULT,
            &mut dispatcher,
        )
        .unwrap();
        // Debris does not collide with debris.
        assert_eq!(bp.pair_cache().len(), 0);
    }

    struct CollectRays {
        hits: Vec<u32>,
    }

    impl RayCallback<u32> for CollectRays {
        fn process(&mut self, _proxy: ProxyId, payload: &u32, _ray: &mut RayCast) -> bool {
            self.hits.push(*payload);
            false
        }
    }

    #[test]
    fn ray_test_via_accelerator_hits_stack() {
        let mut dispatcher = NullDispatcher;
        let mut bp = sweep(16);
        for (tag, y) in [0.0f32, 10.0, 20.0].iter().enumerate() {
            add(&mut bp, &mut dispatcher, v(-1.0, *y, -1.0), v(1.0, y + 1.0, 1.0), tag as u32);
        }
        let mut callback = CollectRays { hits: Vec::new() };
        bp.ray_test(v(0.0, -5.0, 0.0), v(0.0, 30.0, 0.0), &mut callback, Vec3::ZERO, Vec3::ZERO);
        callback.hits.sort_unstable();
        assert_eq!(callback.hits, [0, 1, 2]);
    }

    #[test]
    fn ray_test_fallback_walks_edges() {
        let mut dispatcher = NullDispatcher;
        let mut bp: AxisSweep16<u32> = AxisSweep::with_pair_cache(
            world(),
            16,
            bracken_pairs::HashedPairCache::new(),
            false,
        );
        for (tag, y) in [0.0f32, 10.0, 20.0].iter().enumerate() {
            add(&mut bp, &mut dispatcher, v(-1.0, *y, -1.0), v(1.0, y + 1.0, 1.0), tag as u32);
        }
        let mut callback = CollectRays { hits: Vec::new() };
        bp.ray_test(v(0.0, -5.0, 0.0), v(0.0, 30.0, 0.0), &mut callback, Vec3::ZERO, Vec3::ZERO);
        // The fallback visits every live handle; it is a correctness path,
        // not a culling one.
        callback.hits.sort_unstable();
        assert_eq!(callback.hits, [0, 1, 2]);
    }

    struct CollectBoxes {
        hits: Vec<u32>,
    }

    impl AabbCallback<u32> for CollectBoxes {
        fn process(&mut self, _proxy: ProxyId, payload: &u32) -> bool {
            self.hits.push(*payload);
            false
        }
    }

    #[test]
    fn aabb_test_filters_by_box() {
        let mut dispatcher = NullDispatcher;
        let mut bp: AxisSweep16<u32> = AxisSweep::with_pair_cache(
            world(),
            16,
            bracken_pairs::HashedPairCache::new(),
            false,
        );
        for i in 0..4u32 {
            let x = i as f32 * 10.0;
            add(&mut bp, &mut dispatcher, v(x, 0.0, 0.0), v(x + 2.0, 2.0, 2.0), i);
        }
        let mut callback = CollectBoxes { hits: Vec::new() };
        bp.aabb_test(v(5.0, 0.0, 0.0), v(21.0, 2.0, 2.0), &mut callback);
        callback.hits.sort_unstable();
        assert_eq!(callback.hits, [1, 2]);
    }

    #[test]
    fn deferred_removal_compacts_duplicates_and_stale_pairs() {
        let mut dispatcher = NullDispatcher;
        let mut bp: AxisSweep16<u32, SortedPairCache> =
            AxisSweep::with_pair_cache(world(), 16, SortedPairCache::new(), false);

        let a = add(&mut bp, &mut dispatcher, v(0.0, 0.0, 0.0), v(4.0, 4.0, 4.0), 0);
        let _b = add(&mut bp, &mut dispatcher, v(2.0, 2.0, 2.0), v(6.0, 6.0, 6.0), 1);
        assert_eq!(bp.pair_cache().len(), 1);

        // Pull `a` off `b` and back twice. Deferred mode ignores the remove
        // events, while every return trip appends a fresh add event.
        for _ in 0..2 {
            bp.set_aabb(a, v(0.0, 0.0, 0.0), v(1.0, 4.0, 4.0), &mut dispatcher);
            bp.set_aabb(a, v(0.0, 0.0, 0.0), v(4.0, 4.0, 4.0), &mut dispatcher);
        }
        assert!(bp.pair_cache().len() > 1, "expected duplicate add events");

        bp.calculate_overlapping_pairs(&mut dispatcher);
        assert_eq!(bp.pair_cache().len(), 1, "duplicates must compact to one");

        // Separate them; the sorts emit removes that deferred mode ignores,
        // so the calculate pass has to drop the stale pair.
        bp.set_aabb(a, v(-50.0, 0.0, 0.0), v(-46.0, 4.0, 4.0), &mut dispatcher);
        bp.calculate_overlapping_pairs(&mut dispatcher);
        assert_eq!(bp.pair_cache().len(), 0);
    }

    #[test]
    fn wide_variant_behaves_like_narrow() {
        let mut dispatcher = NullDispatcher;
        let mut bp: AxisSweep32<u32> = AxisSweep::new(world(), 64);
        let _a = add(&mut bp, &mut dispatcher, v(0.0, 0.0, 0.0), v(10.0, 10.0, 10.0), 0);
        let b = add(&mut bp, &mut dispatcher, v(5.0, 5.0, 5.0), v(15.0, 15.0, 15.0), 1);
        assert_eq!(bp.pair_cache().len(), 1);
        bp.set_aabb(b, v(40.0, 5.0, 5.0), v(50.0, 15.0, 15.0), &mut dispatcher);
        assert_eq!(bp.pair_cache().len(), 0);
    }

    #[test]
    fn world_bounds_report_construction_box() {
        let bp = sweep(4);
        assert_eq!(bp.world_bounds(), world());
    }
}
