// Copyright 2025 the Bracken Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The pair cache abstraction shared by every broad-phase backend.

use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::dispatch::{DispatchInfo, Dispatcher, OverlapFilter};
use crate::types::{Pair, PairTarget, ProxyId};

/// The default admission test: each proxy's group must intersect the other's
/// mask.
#[inline]
pub fn default_needs_collision(a: PairTarget, b: PairTarget) -> bool {
    a.group.intersects(b.mask) && b.group.intersects(a.mask)
}

/// Storage for the current set of overlapping pairs.
///
/// Backends call [`PairCache::add_pair`] / [`PairCache::remove_pair`] from
/// inside their sweep or tree traversals; the external dispatcher iterates
/// the result with [`PairCache::process_pairs`]. Implementations differ in
/// lookup cost and in whether removal is immediate or deferred to a
/// sort-and-compact pass.
pub trait PairCache {
    /// Add the canonical pair `(a, b)` if the filters admit it.
    ///
    /// Returns the index of the (possibly pre-existing) pair, or `None` when
    /// the pair was filtered out. Indices are only valid until the next
    /// mutation.
    fn add_pair(&mut self, a: PairTarget, b: PairTarget) -> Option<usize>;

    /// Remove the pair `(a, b)`, releasing its narrow-phase state through the
    /// dispatcher. Returns the pair's scratch word when it existed.
    fn remove_pair(
        &mut self,
        a: ProxyId,
        b: ProxyId,
        dispatcher: &mut dyn Dispatcher,
    ) -> Option<i32>;

    /// Find the index of the pair `(a, b)`.
    fn find_pair(&self, a: ProxyId, b: ProxyId) -> Option<usize>;

    /// Remove every pair mentioning `proxy`.
    fn remove_pairs_containing(&mut self, proxy: ProxyId, dispatcher: &mut dyn Dispatcher) {
        self.process_pairs(dispatcher, &mut |pair| pair.contains_proxy(proxy));
    }

    /// Release the narrow-phase state of every pair mentioning `proxy`, but
    /// keep the pairs themselves.
    fn clean_pairs_containing(&mut self, proxy: ProxyId, dispatcher: &mut dyn Dispatcher) {
        for pair in self.raw_pairs_mut().iter_mut() {
            if pair.contains_proxy(proxy) {
                pair.release_algorithm(dispatcher);
            }
        }
    }

    /// Visit every pair; a `true` return removes the pair after the call.
    fn process_pairs(
        &mut self,
        dispatcher: &mut dyn Dispatcher,
        visit: &mut dyn FnMut(&mut Pair) -> bool,
    );

    /// [`PairCache::process_pairs`], honoring
    /// [`DispatchInfo::deterministic_pairs`] by visiting pairs in canonical
    /// `(id0, id1)` order.
    fn process_pairs_with_info(
        &mut self,
        dispatcher: &mut dyn Dispatcher,
        info: &DispatchInfo,
        visit: &mut dyn FnMut(&mut Pair) -> bool,
    ) {
        let _ = info;
        self.process_pairs(dispatcher, visit);
    }

    /// Rebuild storage in canonical pair order.
    fn sort_pairs(&mut self, dispatcher: &mut dyn Dispatcher) {
        let _ = dispatcher;
    }

    /// The live pair array (dead slots included under deferred removal).
    fn pairs(&self) -> &[Pair];

    /// Raw mutable access for backends that run their own sort-and-compact
    /// pass. Only meaningful on caches with deferred removal; reordering the
    /// array of a hashed cache corrupts its table.
    fn raw_pairs_mut(&mut self) -> &mut Vec<Pair>;

    /// Number of stored pairs.
    fn len(&self) -> usize {
        self.pairs().len()
    }

    /// Whether no pairs are stored.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether removals are deferred to a later compaction pass.
    fn has_deferred_removal(&self) -> bool;

    /// Install (or clear) the user admission filter.
    fn set_overlap_filter(&mut self, filter: Option<Box<dyn OverlapFilter>>);

    /// The admission test this cache applies on add: the user filter when
    /// installed, the group/mask test otherwise.
    fn needs_collision(&self, a: PairTarget, b: PairTarget) -> bool;
}
