// Copyright 2025 the Bracken Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The backend-independent broad-phase contract.

use alloc::vec::Vec;

use bracken_dbvt::NodeIndex;
use bracken_geom::{Aabb3, RayCast, Vec3};
use bracken_pairs::{Dispatcher, FilterGroups, Pair, PairCache, ProxyId};
use bracken_tasks::{ParallelForBody, TaskScheduler};

/// Visitor for [`BroadPhase::aabb_test`]. Returning `true` stops the
/// traversal.
pub trait AabbCallback<P> {
    /// Called for every proxy whose AABB intersects the query box.
    fn process(&mut self, proxy: ProxyId, payload: &P) -> bool;
}

/// Visitor for [`BroadPhase::ray_test`].
///
/// The traversal threads one [`RayCast`] through the whole walk and promises
/// not to mutate it; the callback may shrink [`RayCast::lambda_max`] as
/// closer hits are found (checked on every node), or return `true` to stop
/// outright.
pub trait RayCallback<P> {
    /// Called for every proxy whose AABB the ray segment crosses.
    fn process(&mut self, proxy: ProxyId, payload: &P, ray: &mut RayCast) -> bool;
}

/// The operation set every broad-phase backend exposes; the external
/// dispatcher consumes exactly this contract.
pub trait BroadPhase<P: Copy> {
    /// The pair cache implementation this backend drives.
    type Cache: PairCache;

    /// Insert a proxy. May create pairs immediately. Returns `None` when the
    /// backend's handle capacity is exhausted.
    fn create_proxy(
        &mut self,
        aabb_min: Vec3,
        aabb_max: Vec3,
        payload: P,
        group: FilterGroups,
        mask: FilterGroups,
        dispatcher: &mut dyn Dispatcher,
    ) -> Option<ProxyId>;

    /// Remove a proxy, stripping every pair that mentions it.
    fn destroy_proxy(&mut self, proxy: ProxyId, dispatcher: &mut dyn Dispatcher);

    /// Move a proxy. Idempotent when the new AABB equals the old one.
    fn set_aabb(
        &mut self,
        proxy: ProxyId,
        aabb_min: Vec3,
        aabb_max: Vec3,
        dispatcher: &mut dyn Dispatcher,
    );

    /// The proxy's current world AABB.
    fn aabb(&self, proxy: ProxyId) -> Aabb3;

    /// Walk every proxy the segment `from..to` could hit. `clip_min` /
    /// `clip_max` conservatively fatten the tested volumes (zero vectors for
    /// a pure ray). Re-entrant.
    fn ray_test(
        &self,
        from: Vec3,
        to: Vec3,
        callback: &mut dyn RayCallback<P>,
        clip_min: Vec3,
        clip_max: Vec3,
    );

    /// Walk every proxy whose AABB intersects the query box. Re-entrant.
    fn aabb_test(&self, aabb_min: Vec3, aabb_max: Vec3, callback: &mut dyn AabbCallback<P>);

    /// Flush deferred pair work: compact duplicates, drop pairs whose AABBs
    /// no longer overlap, advance any internal staging.
    fn calculate_overlapping_pairs(&mut self, dispatcher: &mut dyn Dispatcher);

    /// The pair cache holding the current overlap set.
    fn pair_cache(&self) -> &Self::Cache;

    /// Mutable access to the pair cache.
    fn pair_cache_mut(&mut self) -> &mut Self::Cache;

    /// Conservative bounds of everything the broad-phase tracks.
    fn world_bounds(&self) -> Aabb3;

    /// Reset internal allocators. Only legal with zero live proxies; a call
    /// with proxies present is ignored.
    fn reset_pool(&mut self, dispatcher: &mut dyn Dispatcher);
}

/// A pre-sized set of ray traversal stacks, one per worker.
///
/// Parallel ray batches split the pool with [`RayStackPool::stacks_mut`] so
/// every worker owns one stack for the duration of the batch; a single
/// caller can simply index by its thread hint.
#[derive(Debug, Default)]
pub struct RayStackPool {
    stacks: Vec<Vec<NodeIndex>>,
}

impl RayStackPool {
    /// Create a pool of `thread_count` stacks.
    pub fn new(thread_count: usize) -> Self {
        let mut stacks = Vec::new();
        stacks.resize_with(thread_count.max(1), Vec::new);
        Self { stacks }
    }

    /// The stack for `thread_index` (wrapping past the pool size).
    pub fn stack_mut(&mut self, thread_index: usize) -> &mut Vec<NodeIndex> {
        let len = self.stacks.len();
        &mut self.stacks[thread_index % len]
    }

    /// All stacks, for splitting across workers.
    pub fn stacks_mut(&mut self) -> &mut [Vec<NodeIndex>] {
        &mut self.stacks
    }
}

struct PairSlice<'a> {
    pairs: &'a [Pair],
    visit: &'a (dyn Fn(&Pair) + Sync),
}

impl ParallelForBody for PairSlice<'_> {
    fn for_loop(&self, begin: usize, end: usize) {
        for pair in &self.pairs[begin..end] {
            (self.visit)(pair);
        }
    }
}

/// Drive `visit` over the pair list through a task scheduler, `grain` pairs
/// per chunk. The broad-phase produced `pairs` sequentially; this is where
/// narrow-phase work fans out.
pub fn dispatch_pairs(
    scheduler: &dyn TaskScheduler,
    pairs: &[Pair],
    grain: usize,
    visit: &(dyn Fn(&Pair) + Sync),
) {
    scheduler.parallel_for(0, pairs.len(), grain, &PairSlice { pairs, visit });
}

#[cfg(test)]
mod tests {
    use super::{RayStackPool, dispatch_pairs};
    use bracken_pairs::{FilterGroups, Pair, PairTarget, ProxyId};
    use bracken_tasks::SequentialScheduler;
    use core::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn stack_pool_wraps_thread_hints() {
        let mut pool = RayStackPool::new(3);
        pool.stack_mut(0).push(bracken_dbvt::NodeIndex::NONE);
        assert_eq!(pool.stack_mut(3).len(), 1, "hint 3 wraps to stack 0");
        assert_eq!(pool.stacks_mut().len(), 3);
    }

    #[test]
    fn dispatch_covers_every_pair() {
        let target = |id: u32| {
            PairTarget::new(ProxyId::new(id), FilterGroups::DEFAULT, FilterGroups::ALL)
        };
        let pairs: alloc::vec::Vec<Pair> =
            (0..10).map(|i| Pair::new(target(i), target(i + 100))).collect();
        let visited = AtomicUsize::new(0);
        dispatch_pairs(&SequentialScheduler, &pairs, 4, &|_pair| {
            visited.fetch_add(1, Ordering::Relaxed);
        });
        assert_eq!(visited.load(Ordering::Relaxed), 10);
    }
}
