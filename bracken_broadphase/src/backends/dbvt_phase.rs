// Copyright 2025 the Bracken Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Broad-phase backed by two dynamic bounding volume trees.

use alloc::vec::Vec;

use bracken_dbvt::{Dbvt, NodeIndex};
use bracken_geom::{Aabb3, RayCast, Vec3};
use bracken_pairs::{
    Dispatcher, FilterGroups, HashedPairCache, Pair, PairCache, PairTarget, ProxyId,
};

use crate::interface::{AabbCallback, BroadPhase, RayCallback, RayStackPool};

/// Fattening margin applied to every reinserted leaf volume.
pub const DBVT_MARGIN: f32 = 0.05;

/// Stages in the dynamic ring. A proxy untouched for a full trip around the
/// ring migrates to the fixed set.
const STAGE_COUNT: usize = 2;
/// Sentinel stage of proxies living in the fixed set.
const FIXED_STAGE: usize = STAGE_COUNT;

const DYNAMIC_SET: usize = 0;
const FIXED_SET: usize = 1;

#[derive(Clone, Debug)]
struct ProxyEntry<P> {
    aabb: Aabb3,
    payload: P,
    group: FilterGroups,
    mask: FilterGroups,
    leaf: NodeIndex,
    stage: usize,
    /// Intrusive doubly-linked stage list: previous and next slots.
    links: [Option<u32>; 2],
}

fn entry_of<P>(proxies: &[Option<ProxyEntry<P>>], slot: u32) -> &ProxyEntry<P> {
    proxies[slot as usize]
        .as_ref()
        .expect("broad-phase invariant violated: reference to vacant proxy slot")
}

fn target_of<P>(proxies: &[Option<ProxyEntry<P>>], slot: u32) -> PairTarget {
    let entry = entry_of(proxies, slot);
    PairTarget::new(ProxyId::new(slot), entry.group, entry.mask)
}

fn leaf_volume<P>(sets: &[Dbvt; 2], proxies: &[Option<ProxyEntry<P>>], id: ProxyId) -> Aabb3 {
    let entry = entry_of(proxies, id.raw());
    let set = if entry.stage == FIXED_STAGE { FIXED_SET } else { DYNAMIC_SET };
    sets[set].volume(entry.leaf)
}

/// Broad-phase that keeps moving proxies in one tree and resting proxies in
/// another.
///
/// Every proxy is stamped with a stage; [`DbvtBroadPhase::calculate_overlapping_pairs`]
/// advances the stage ring, and a proxy that sat still through the whole
/// ring is reinserted into the fixed tree, where it stops paying per-frame
/// costs. Any [`DbvtBroadPhase::set_aabb`] pulls it back into the dynamic
/// tree.
///
/// Updated leaves are fattened by [`DBVT_MARGIN`] plus a velocity term
/// (half extent scaled by [`DbvtBroadPhase::velocity_prediction`], signed
/// along the motion), so small coherent moves usually skip tree surgery
/// entirely.
///
/// Pair bookkeeping is incremental: immediate tree-vs-leaf collisions on
/// every change (unless [`DbvtBroadPhase::deferred_collide`] batches them
/// into the calculate pass), plus a rotating cleanup window that re-tests a
/// [`DbvtBroadPhase::cleanup_pct`] slice of the cache per frame and drops
/// stale pairs.
pub struct DbvtBroadPhase<P, C: PairCache = HashedPairCache> {
    sets: [Dbvt; 2],
    proxies: Vec<Option<ProxyEntry<P>>>,
    free_slots: Vec<u32>,
    stage_roots: [Option<u32>; STAGE_COUNT + 1],
    stage_current: usize,
    pair_cache: C,
    /// Scale of the velocity term used to fatten updated leaves.
    pub velocity_prediction: f32,
    /// Percent of dynamic-set leaves rebalanced per frame.
    pub dynamic_updates_pct: usize,
    /// Percent of fixed-set leaves rebalanced per frame while any fixed
    /// rebalancing budget remains.
    pub fixed_updates_pct: usize,
    /// Percent of the pair cache re-tested for staleness per frame.
    pub cleanup_pct: usize,
    /// When set, proxy changes only record staging; all tree-vs-tree
    /// collision happens inside the calculate pass.
    pub deferred_collide: bool,
    new_pair_count: usize,
    fixed_left: usize,
    updates_call: usize,
    updates_done: usize,
    updates_ratio: f32,
    pass_count: usize,
    cleanup_index: usize,
    need_cleanup: bool,
    collide_stack: Vec<(NodeIndex, NodeIndex)>,
}

impl<P: Copy> Default for DbvtBroadPhase<P, HashedPairCache> {
    fn default() -> Self {
        Self::new(HashedPairCache::new())
    }
}

impl<P, C: PairCache> core::fmt::Debug for DbvtBroadPhase<P, C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DbvtBroadPhase")
            .field("dynamic", &self.sets[DYNAMIC_SET].leaf_count())
            .field("fixed", &self.sets[FIXED_SET].leaf_count())
            .field("pairs", &self.pair_cache.len())
            .field("stage", &self.stage_current)
            .finish_non_exhaustive()
    }
}

impl<P: Copy, C: PairCache> DbvtBroadPhase<P, C> {
    /// Create a broad-phase driving `pair_cache`.
    pub fn new(pair_cache: C) -> Self {
        Self {
            sets: [Dbvt::new(), Dbvt::new()],
            proxies: Vec::new(),
            free_slots: Vec::new(),
            stage_roots: [None; STAGE_COUNT + 1],
            stage_current: 0,
            pair_cache,
            velocity_prediction: 0.0,
            dynamic_updates_pct: 0,
            fixed_updates_pct: 1,
            cleanup_pct: 10,
            deferred_collide: false,
            new_pair_count: 1,
            fixed_left: 0,
            updates_call: 0,
            updates_done: 0,
            updates_ratio: 0.0,
            pass_count: 0,
            cleanup_index: 0,
            need_cleanup: true,
            collide_stack: Vec::new(),
        }
    }

    /// Live proxies in the dynamic set.
    pub fn dynamic_count(&self) -> usize {
        self.sets[DYNAMIC_SET].leaf_count()
    }

    /// Live proxies in the fixed set.
    pub fn fixed_count(&self) -> usize {
        self.sets[FIXED_SET].leaf_count()
    }

    /// Total live proxies.
    pub fn proxy_count(&self) -> usize {
        self.dynamic_count() + self.fixed_count()
    }

    /// Fraction of recent `set_aabb` calls that actually moved a leaf.
    pub fn update_ratio(&self) -> f32 {
        self.updates_ratio
    }

    /// Frames processed so far.
    pub fn pass_count(&self) -> usize {
        self.pass_count
    }

    /// Full median-split rebuild of both trees. One-off cost; use when the
    /// world composition changed wholesale.
    pub fn optimize(&mut self) {
        self.sets[DYNAMIC_SET].optimize_top_down(128);
        self.sets[FIXED_SET].optimize_top_down(128);
    }

    fn entry(&self, slot: u32) -> &ProxyEntry<P> {
        entry_of(&self.proxies, slot)
    }

    fn entry_mut(&mut self, slot: u32) -> &mut ProxyEntry<P> {
        self.proxies[slot as usize]
            .as_mut()
            .expect("broad-phase invariant violated: reference to vacant proxy slot")
    }

    fn list_append(&mut self, slot: u32, stage: usize) {
        let head = self.stage_roots[stage];
        self.entry_mut(slot).links = [None, head];
        if let Some(h) = head {
            self.entry_mut(h).links[0] = Some(slot);
        }
        self.stage_roots[stage] = Some(slot);
    }

    fn list_remove(&mut self, slot: u32, stage: usize) {
        let links = self.entry(slot).links;
        match links[0] {
            Some(prev) => self.entry_mut(prev).links[1] = links[1],
            None => self.stage_roots[stage] = links[1],
        }
        if let Some(next) = links[1] {
            self.entry_mut(next).links[0] = links[0];
        }
    }

    /// Collide `leaf` (a dynamic-set leaf) against both trees, feeding the
    /// pair cache.
    fn collide_leaf(&mut self, leaf: NodeIndex) {
        let [dynamic_set, fixed_set] = &self.sets;
        let proxies = &self.proxies;
        let cache = &mut self.pair_cache;
        let stack = &mut self.collide_stack;
        let mut added = 0usize;
        let mut policy = |a: u32, b: u32| {
            cache.add_pair(target_of(proxies, a), target_of(proxies, b));
            added += 1;
        };
        fixed_set.collide_tt_with(fixed_set.root(), dynamic_set, leaf, stack, &mut policy);
        dynamic_set.collide_tt(dynamic_set.root(), leaf, stack, &mut policy);
        self.new_pair_count += added;
    }

    fn collide_frame(&mut self, dispatcher: &mut dyn Dispatcher) {
        // Amortized rebalancing. The dynamic tree gets its slice every
        // frame; the fixed tree only while promotion left it work to do.
        let dynamic_leaves = self.sets[DYNAMIC_SET].leaf_count();
        self.sets[DYNAMIC_SET]
            .optimize_incremental((1 + dynamic_leaves * self.dynamic_updates_pct / 100) as i32);
        if self.fixed_left > 0 {
            let fixed_leaves = self.sets[FIXED_SET].leaf_count();
            let budget = 1 + fixed_leaves * self.fixed_updates_pct / 100;
            self.sets[FIXED_SET].optimize_incremental(budget as i32);
            self.fixed_left = self.fixed_left.saturating_sub(budget);
        }

        // Advance the stage ring. Whatever still sits in the slot we just
        // arrived at has not moved for a full trip: stage it out.
        self.stage_current = (self.stage_current + 1) % STAGE_COUNT;
        let mut current = self.stage_roots[self.stage_current];
        let promoted = current.is_some();
        while let Some(slot) = current {
            let next = self.entry(slot).links[1];
            self.list_remove(slot, self.stage_current);
            self.list_append(slot, FIXED_STAGE);

            let (leaf, aabb) = {
                let entry = self.entry(slot);
                (entry.leaf, entry.aabb)
            };
            self.sets[DYNAMIC_SET].remove(leaf);
            let new_leaf = self.sets[FIXED_SET].insert(aabb, slot);
            let entry = self.entry_mut(slot);
            entry.leaf = new_leaf;
            entry.stage = FIXED_STAGE;
            current = next;
        }
        if promoted {
            self.fixed_left = self.sets[FIXED_SET].leaf_count();
            self.need_cleanup = true;
        }

        // Batched collision when immediate collides are off.
        if self.deferred_collide {
            let [dynamic_set, fixed_set] = &self.sets;
            let proxies = &self.proxies;
            let cache = &mut self.pair_cache;
            let stack = &mut self.collide_stack;
            let mut added = 0usize;
            let mut policy = |a: u32, b: u32| {
                cache.add_pair(target_of(proxies, a), target_of(proxies, b));
                added += 1;
            };
            dynamic_set.collide_tt_with(
                dynamic_set.root(),
                fixed_set,
                fixed_set.root(),
                stack,
                &mut policy,
            );
            dynamic_set.collide_tt(dynamic_set.root(), dynamic_set.root(), stack, &mut policy);
            self.new_pair_count += added;
        }

        // Rotating cleanup window: re-test a slice of the cache against the
        // current leaf volumes and drop pairs that drifted apart.
        if self.need_cleanup && !self.pair_cache.is_empty() {
            let window = self
                .new_pair_count
                .max(self.pair_cache.len() * self.cleanup_pct / 100);
            let mut ni = self.pair_cache.len().min(window);
            let mut i = 0;
            while i < ni && !self.pair_cache.is_empty() {
                let index = (self.cleanup_index + i) % self.pair_cache.len();
                let pair: Pair = self.pair_cache.pairs()[index];
                let va = leaf_volume(&self.sets, &self.proxies, pair.proxy0.id);
                let vb = leaf_volume(&self.sets, &self.proxies, pair.proxy1.id);
                if va.overlaps(&vb) {
                    i += 1;
                } else {
                    self.pair_cache
                        .remove_pair(pair.proxy0.id, pair.proxy1.id, dispatcher);
                    ni = ni.saturating_sub(1);
                    if self.pair_cache.has_deferred_removal() {
                        // Deferred caches keep the slot until compaction;
                        // step past it instead of re-testing it forever.
                        i += 1;
                    }
                }
            }
            self.cleanup_index = if self.pair_cache.is_empty() {
                0
            } else {
                (self.cleanup_index + ni) % self.pair_cache.len()
            };
        }

        self.pass_count += 1;
        self.new_pair_count = 1;
        self.need_cleanup = false;
        self.updates_ratio = if self.updates_call > 0 {
            self.updates_done as f32 / self.updates_call as f32
        } else {
            0.0
        };
        self.updates_done /= 2;
        self.updates_call /= 2;
    }

    /// Sort-and-compact pass for caches with deferred removal: collocate
    /// duplicates, drop them and every pair whose fattened leaf volumes no
    /// longer touch.
    fn perform_deferred_removal(&mut self, dispatcher: &mut dyn Dispatcher) {
        if !self.pair_cache.has_deferred_removal() || self.pair_cache.is_empty() {
            return;
        }
        let sets = &self.sets;
        let proxies = &self.proxies;
        let raw = self.pair_cache.raw_pairs_mut();
        raw.sort_unstable_by_key(Pair::key);

        let mut invalid = 0usize;
        let mut previous: Option<(ProxyId, ProxyId)> = None;
        for pair in raw.iter_mut() {
            let duplicate = previous == Some(pair.key());
            previous = Some(pair.key());
            let needs_removal = if duplicate {
                debug_assert!(pair.algorithm.is_none(), "duplicate pair owns narrow-phase state");
                true
            } else {
                let va = leaf_volume(sets, proxies, pair.proxy0.id);
                let vb = leaf_volume(sets, proxies, pair.proxy1.id);
                !va.overlaps(&vb)
            };
            if needs_removal {
                pair.release_algorithm(dispatcher);
                pair.invalidate();
                invalid += 1;
            }
        }

        // Invalid slots carry the sentinel id and sort to the end.
        raw.sort_unstable_by_key(Pair::key);
        let keep = raw.len() - invalid;
        raw.truncate(keep);
    }

    /// Like [`BroadPhase::set_aabb`] but always reinserting, even when the
    /// fattened leaf still covers the new box. Escape hatch for hosts that
    /// must see shrinking volumes immediately.
    pub fn set_aabb_force_update(
        &mut self,
        proxy: ProxyId,
        aabb_min: Vec3,
        aabb_max: Vec3,
        _dispatcher: &mut dyn Dispatcher,
    ) {
        let slot = proxy.raw();
        let aabb = Aabb3::new(aabb_min, aabb_max);
        let (stage, leaf) = {
            let entry = self.entry(slot);
            (entry.stage, entry.leaf)
        };
        let new_leaf = if stage == FIXED_STAGE {
            self.sets[FIXED_SET].remove(leaf);
            self.sets[DYNAMIC_SET].insert(aabb, slot)
        } else {
            self.updates_call += 1;
            self.sets[DYNAMIC_SET].update(leaf, aabb);
            self.updates_done += 1;
            leaf
        };
        self.list_remove(slot, stage);
        let stage_current = self.stage_current;
        {
            let entry = self.entry_mut(slot);
            entry.aabb = aabb;
            entry.leaf = new_leaf;
            entry.stage = stage_current;
        }
        self.list_append(slot, self.stage_current);
        self.need_cleanup = true;
        if !self.deferred_collide {
            self.collide_leaf(new_leaf);
        }
    }

    /// [`BroadPhase::ray_test`] drawing its traversal stack from a pool by
    /// thread hint: worker `thread_index` of a ray batch reuses the same
    /// pre-sized stack on every cast instead of allocating per call.
    ///
    /// A worker owns its pool slot for the duration of a batch; hosts that
    /// fan rays out split the pool with [`RayStackPool::stacks_mut`] first
    /// and hand each worker its own slice.
    pub fn ray_test_hinted(
        &self,
        from: Vec3,
        to: Vec3,
        callback: &mut dyn RayCallback<P>,
        clip_min: Vec3,
        clip_max: Vec3,
        stacks: &mut RayStackPool,
        thread_index: usize,
    ) {
        self.ray_test_with_stack(
            from,
            to,
            callback,
            clip_min,
            clip_max,
            stacks.stack_mut(thread_index),
        );
    }

    /// [`BroadPhase::ray_test`] with a caller-supplied traversal stack, for
    /// hosts running ray batches (see
    /// [`RayStackPool`](crate::RayStackPool)).
    pub fn ray_test_with_stack(
        &self,
        from: Vec3,
        to: Vec3,
        callback: &mut dyn RayCallback<P>,
        clip_min: Vec3,
        clip_max: Vec3,
        stack: &mut Vec<NodeIndex>,
    ) {
        let mut ray = RayCast::new(from, to);
        let proxies = &self.proxies;
        let mut stopped = false;
        for set in &self.sets {
            if stopped || ray.lambda_max <= 0.0 {
                break;
            }
            set.ray_test_internal(
                set.root(),
                from,
                &mut ray,
                clip_min,
                clip_max,
                stack,
                &mut |slot, ray| {
                    let entry = entry_of(proxies, slot);
                    stopped = callback.process(ProxyId::new(slot), &entry.payload, ray);
                    stopped
                },
            );
        }
    }
}

impl<P: Copy, C: PairCache> BroadPhase<P> for DbvtBroadPhase<P, C> {
    type Cache = C;

    fn create_proxy(
        &mut self,
        aabb_min: Vec3,
        aabb_max: Vec3,
        payload: P,
        group: FilterGroups,
        mask: FilterGroups,
        _dispatcher: &mut dyn Dispatcher,
    ) -> Option<ProxyId> {
        let aabb = Aabb3::new(aabb_min, aabb_max);
        let slot = match self.free_slots.pop() {
            Some(slot) => slot,
            None => {
                self.proxies.push(None);
                (self.proxies.len() - 1) as u32
            }
        };
        let leaf = self.sets[DYNAMIC_SET].insert(aabb, slot);
        self.proxies[slot as usize] = Some(ProxyEntry {
            aabb,
            payload,
            group,
            mask,
            leaf,
            stage: self.stage_current,
            links: [None, None],
        });
        self.list_append(slot, self.stage_current);

        if !self.deferred_collide {
            let [dynamic_set, fixed_set] = &self.sets;
            let proxies = &self.proxies;
            let cache = &mut self.pair_cache;
            let mut added = 0usize;
            for set in [dynamic_set, fixed_set] {
                set.collide_tv(set.root(), &aabb, &mut |other| {
                    if other != slot {
                        cache.add_pair(target_of(proxies, slot), target_of(proxies, other));
                        added += 1;
                    }
                    false
                });
            }
            self.new_pair_count += added;
        }
        Some(ProxyId::new(slot))
    }

    fn destroy_proxy(&mut self, proxy: ProxyId, dispatcher: &mut dyn Dispatcher) {
        let slot = proxy.raw();
        let (stage, leaf) = {
            let entry = self.entry(slot);
            (entry.stage, entry.leaf)
        };
        let set = if stage == FIXED_STAGE { FIXED_SET } else { DYNAMIC_SET };
        self.sets[set].remove(leaf);
        self.list_remove(slot, stage);
        self.pair_cache.remove_pairs_containing(proxy, dispatcher);
        self.proxies[slot as usize] = None;
        self.free_slots.push(slot);
        self.need_cleanup = true;
    }

    fn set_aabb(
        &mut self,
        proxy: ProxyId,
        aabb_min: Vec3,
        aabb_max: Vec3,
        _dispatcher: &mut dyn Dispatcher,
    ) {
        let slot = proxy.raw();
        let aabb = Aabb3::new(aabb_min, aabb_max);
        let (stage, leaf, old_aabb) = {
            let entry = self.entry(slot);
            (entry.stage, entry.leaf, entry.aabb)
        };
        if aabb == old_aabb {
            return;
        }

        let mut do_collide = false;
        let mut new_leaf = leaf;
        if stage == FIXED_STAGE {
            // Fixed proxies that move rejoin the dynamic set.
            self.sets[FIXED_SET].remove(leaf);
            new_leaf = self.sets[DYNAMIC_SET].insert(aabb, slot);
            do_collide = true;
        } else {
            self.updates_call += 1;
            if self.sets[DYNAMIC_SET].volume(leaf).overlaps(&aabb) {
                // Coherent motion: fatten along the observed direction and
                // let the containment test skip the reinsertion when it can.
                let delta = aabb_min - old_aabb.min;
                let mut velocity = old_aabb.extents() * self.velocity_prediction;
                if delta.x < 0.0 {
                    velocity.x = -velocity.x;
                }
                if delta.y < 0.0 {
                    velocity.y = -velocity.y;
                }
                if delta.z < 0.0 {
                    velocity.z = -velocity.z;
                }
                if self.sets[DYNAMIC_SET].update_with_velocity(leaf, aabb, velocity, DBVT_MARGIN)
                {
                    self.updates_done += 1;
                    do_collide = true;
                }
            } else {
                // Teleport.
                self.sets[DYNAMIC_SET].update(leaf, aabb);
                self.updates_done += 1;
                do_collide = true;
            }
        }

        self.list_remove(slot, stage);
        let stage_current = self.stage_current;
        {
            let entry = self.entry_mut(slot);
            entry.aabb = aabb;
            entry.leaf = new_leaf;
            entry.stage = stage_current;
        }
        self.list_append(slot, self.stage_current);

        if do_collide {
            self.need_cleanup = true;
            if !self.deferred_collide {
                self.collide_leaf(new_leaf);
            }
        }
    }

    fn aabb(&self, proxy: ProxyId) -> Aabb3 {
        self.entry(proxy.raw()).aabb
    }

    fn ray_test(
        &self,
        from: Vec3,
        to: Vec3,
        callback: &mut dyn RayCallback<P>,
        clip_min: Vec3,
        clip_max: Vec3,
    ) {
        let mut stack = Vec::new();
        self.ray_test_with_stack(from, to, callback, clip_min, clip_max, &mut stack);
    }

    fn aabb_test(&self, aabb_min: Vec3, aabb_max: Vec3, callback: &mut dyn AabbCallback<P>) {
        let volume = Aabb3::new(aabb_min, aabb_max);
        let proxies = &self.proxies;
        let mut stopped = false;
        for set in &self.sets {
            if stopped {
                break;
            }
            set.collide_tv(set.root(), &volume, &mut |slot| {
                let entry = entry_of(proxies, slot);
                stopped = callback.process(ProxyId::new(slot), &entry.payload);
                stopped
            });
        }
    }

    fn calculate_overlapping_pairs(&mut self, dispatcher: &mut dyn Dispatcher) {
        self.collide_frame(dispatcher);
        self.perform_deferred_removal(dispatcher);
    }

    fn pair_cache(&self) -> &C {
        &self.pair_cache
    }

    fn pair_cache_mut(&mut self) -> &mut C {
        &mut self.pair_cache
    }

    fn world_bounds(&self) -> Aabb3 {
        let dynamic_root = self.sets[DYNAMIC_SET].root();
        let fixed_root = self.sets[FIXED_SET].root();
        match (dynamic_root.is_some(), fixed_root.is_some()) {
            (true, true) => self.sets[DYNAMIC_SET]
                .volume(dynamic_root)
                .union(&self.sets[FIXED_SET].volume(fixed_root)),
            (true, false) => self.sets[DYNAMIC_SET].volume(dynamic_root),
            (false, true) => self.sets[FIXED_SET].volume(fixed_root),
            (false, false) => Aabb3::default(),
        }
    }

    fn reset_pool(&mut self, _dispatcher: &mut dyn Dispatcher) {
        if self.proxy_count() != 0 {
            return;
        }
        self.sets = [Dbvt::new(), Dbvt::new()];
        self.proxies.clear();
        self.free_slots.clear();
        self.stage_roots = [None; STAGE_COUNT + 1];
        self.stage_current = 0;
        self.velocity_prediction = 0.0;
        self.dynamic_updates_pct = 0;
        self.fixed_updates_pct = 1;
        self.cleanup_pct = 10;
        self.deferred_collide = false;
        self.new_pair_count = 1;
        self.fixed_left = 0;
        self.updates_call = 0;
        self.updates_done = 0;
        self.updates_ratio = 0.0;
        self.pass_count = 0;
        self.cleanup_index = 0;
        self.need_cleanup = true;
        self.collide_stack.clear();
    }
}
