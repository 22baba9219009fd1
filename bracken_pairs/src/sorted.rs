// Copyright 2025 the Bracken Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The array-only pair cache and the no-op cache.

use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::cache::{PairCache, default_needs_collision};
use crate::dispatch::{Dispatcher, OverlapFilter};
use crate::types::{Pair, PairTarget, ProxyId};

/// Pair cache without a hash table.
///
/// Adds append blindly (duplicates included); the owning broad-phase's
/// sort-and-compact pass is what restores the at-most-once guarantee. That
/// deferred-removal policy is on by default and is the reason to pick this
/// cache: edge sorts can emit add/remove churn without paying a hash probe
/// per event.
pub struct SortedPairCache {
    pairs: Vec<Pair>,
    deferred_removal: bool,
    filter: Option<Box<dyn OverlapFilter>>,
}

impl Default for SortedPairCache {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for SortedPairCache {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SortedPairCache")
            .field("pairs", &self.pairs.len())
            .field("deferred_removal", &self.deferred_removal)
            .field("filter", &self.filter.is_some())
            .finish()
    }
}

impl SortedPairCache {
    /// Create an empty cache with deferred removal enabled.
    pub fn new() -> Self {
        Self {
            pairs: Vec::with_capacity(2),
            deferred_removal: true,
            filter: None,
        }
    }

    /// Toggle the deferred-removal policy. With it off, removals take effect
    /// immediately via swap-and-pop.
    pub fn set_deferred_removal(&mut self, deferred: bool) {
        self.deferred_removal = deferred;
    }
}

impl PairCache for SortedPairCache {
    fn add_pair(&mut self, a: PairTarget, b: PairTarget) -> Option<usize> {
        debug_assert!(a.id != b.id, "a proxy cannot pair with itself");
        if !self.needs_collision(a, b) {
            return None;
        }
        self.pairs.push(Pair::new(a, b));
        Some(self.pairs.len() - 1)
    }

    fn remove_pair(
        &mut self,
        a: ProxyId,
        b: ProxyId,
        dispatcher: &mut dyn Dispatcher,
    ) -> Option<i32> {
        if self.deferred_removal {
            // Deferred mode leaves the slot for the compaction pass.
            return None;
        }
        let (id0, id1) = if a < b { (a, b) } else { (b, a) };
        let index = self.pairs.iter().position(|p| p.key() == (id0, id1))?;
        self.pairs[index].release_algorithm(dispatcher);
        let scratch = self.pairs[index].scratch;
        self.pairs.swap_remove(index);
        Some(scratch)
    }

    fn find_pair(&self, a: ProxyId, b: ProxyId) -> Option<usize> {
        let (id0, id1) = if a < b { (a, b) } else { (b, a) };
        self.pairs.iter().position(|p| p.key() == (id0, id1))
    }

    fn process_pairs(
        &mut self,
        dispatcher: &mut dyn Dispatcher,
        visit: &mut dyn FnMut(&mut Pair) -> bool,
    ) {
        let mut i = 0;
        while i < self.pairs.len() {
            if visit(&mut self.pairs[i]) {
                self.pairs[i].release_algorithm(dispatcher);
                self.pairs.swap_remove(i);
            } else {
                i += 1;
            }
        }
    }

    fn pairs(&self) -> &[Pair] {
        &self.pairs
    }

    fn raw_pairs_mut(&mut self) -> &mut Vec<Pair> {
        &mut self.pairs
    }

    fn has_deferred_removal(&self) -> bool {
        self.deferred_removal
    }

    fn set_overlap_filter(&mut self, filter: Option<Box<dyn OverlapFilter>>) {
        self.filter = filter;
    }

    fn needs_collision(&self, a: PairTarget, b: PairTarget) -> bool {
        match &self.filter {
            Some(filter) => filter.needs_collision(a, b),
            None => default_needs_collision(a, b),
        }
    }
}

/// A pair cache that stores nothing.
///
/// Ray-cast accelerator trees plug this in so their inserts and updates
/// never touch pair bookkeeping.
#[derive(Debug, Default)]
pub struct NullPairCache {
    empty: Vec<Pair>,
}

impl NullPairCache {
    /// Create the no-op cache.
    pub fn new() -> Self {
        Self::default()
    }
}

impl PairCache for NullPairCache {
    fn add_pair(&mut self, _a: PairTarget, _b: PairTarget) -> Option<usize> {
        None
    }

    fn remove_pair(
        &mut self,
        _a: ProxyId,
        _b: ProxyId,
        _dispatcher: &mut dyn Dispatcher,
    ) -> Option<i32> {
        None
    }

    fn find_pair(&self, _a: ProxyId, _b: ProxyId) -> Option<usize> {
        None
    }

    fn process_pairs(
        &mut self,
        _dispatcher: &mut dyn Dispatcher,
        _visit: &mut dyn FnMut(&mut Pair) -> bool,
    ) {
    }

    fn pairs(&self) -> &[Pair] {
        &self.empty
    }

    fn raw_pairs_mut(&mut self) -> &mut Vec<Pair> {
        &mut self.empty
    }

    fn has_deferred_removal(&self) -> bool {
        true
    }

    fn set_overlap_filter(&mut self, _filter: Option<Box<dyn OverlapFilter>>) {}

    fn needs_collision(&self, _a: PairTarget, _b: PairTarget) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::{NullPairCache, SortedPairCache};
    use crate::cache::PairCache;
    use crate::dispatch::NullDispatcher;
    use crate::types::{FilterGroups, PairTarget, ProxyId};

    fn target(id: u32) -> PairTarget {
        PairTarget::new(ProxyId::new(id), FilterGroups::DEFAULT, FilterGroups::ALL)
    }

    #[test]
    fn deferred_removal_is_the_default() {
        let mut cache = SortedPairCache::new();
        let mut dispatcher = NullDispatcher;
        assert!(cache.has_deferred_removal());
        cache.add_pair(target(1), target(2));
        // Deferred mode: the remove is a no-op until compaction.
        assert!(
            cache
                .remove_pair(ProxyId::new(1), ProxyId::new(2), &mut dispatcher)
                .is_none()
        );
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn immediate_removal_swaps_with_tail() {
        let mut cache = SortedPairCache::new();
        let mut dispatcher = NullDispatcher;
        cache.set_deferred_removal(false);
        cache.add_pair(target(1), target(2));
        cache.add_pair(target(3), target(4));
        cache.add_pair(target(5), target(6));
        cache.remove_pair(ProxyId::new(1), ProxyId::new(2), &mut dispatcher);
        assert_eq!(cache.len(), 2);
        assert!(cache.find_pair(ProxyId::new(5), ProxyId::new(6)).is_some());
        assert!(cache.find_pair(ProxyId::new(1), ProxyId::new(2)).is_none());
    }

    #[test]
    fn duplicates_are_allowed_until_compaction() {
        let mut cache = SortedPairCache::new();
        cache.add_pair(target(1), target(2));
        cache.add_pair(target(2), target(1));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn process_pairs_compacts() {
        let mut cache = SortedPairCache::new();
        let mut dispatcher = NullDispatcher;
        for i in 0..6 {
            cache.add_pair(target(i), target(i + 10));
        }
        cache.process_pairs(&mut dispatcher, &mut |pair| pair.proxy0.id.raw() % 2 == 0);
        assert_eq!(cache.len(), 3);
        for pair in cache.pairs() {
            assert_eq!(pair.proxy0.id.raw() % 2, 1);
        }
    }

    #[test]
    fn null_cache_stores_nothing() {
        let mut cache = NullPairCache::new();
        let mut dispatcher = NullDispatcher;
        assert!(cache.add_pair(target(1), target(2)).is_none());
        assert!(cache.is_empty());
        assert!(
            cache
                .remove_pair(ProxyId::new(1), ProxyId::new(2), &mut dispatcher)
                .is_none()
        );
        let mut visited = 0;
        cache.process_pairs(&mut dispatcher, &mut |_p| {
            visited += 1;
            false
        });
        assert_eq!(visited, 0);
    }
}
