// Copyright 2025 the Bracken Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The default pair cache: a contiguous pair array indexed by a chained hash
//! table.

use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::cache::{PairCache, default_needs_collision};
use crate::dispatch::{DispatchInfo, Dispatcher, OverlapFilter};
use crate::types::{Pair, PairTarget, ProxyId};

const NIL: u32 = u32::MAX;

/// Thomas Wang's 32-bit integer mix over the packed id pair.
///
/// Ids above 16 bits fold into the low half; the chain walk disambiguates
/// collisions, so folding only costs probe length, never correctness.
#[inline]
fn pair_hash(id0: u32, id1: u32) -> u32 {
    let mut key = id0 | (id1 << 16);
    key = key.wrapping_add(!(key << 15));
    key ^= key >> 10;
    key = key.wrapping_add(key << 3);
    key ^= key >> 6;
    key = key.wrapping_add(!(key << 11));
    key ^= key >> 16;
    key
}

/// Hash-indexed pair cache with immediate swap-and-pop removal.
///
/// Storage is a pair array plus two parallel tables: `buckets[h]` holds the
/// index of the first pair whose hash lands in bucket `h`, and `next[i]`
/// chains pairs within a bucket. The bucket count always equals the pair
/// array's capacity and is a power of two, so `hash & (capacity - 1)` is the
/// bucket index. Growing the array rehashes both tables.
pub struct HashedPairCache {
    pairs: Vec<Pair>,
    buckets: Vec<u32>,
    next: Vec<u32>,
    filter: Option<Box<dyn OverlapFilter>>,
}

impl Default for HashedPairCache {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for HashedPairCache {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HashedPairCache")
            .field("pairs", &self.pairs.len())
            .field("buckets", &self.buckets.len())
            .field("filter", &self.filter.is_some())
            .finish()
    }
}

impl HashedPairCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        let mut cache = Self {
            pairs: Vec::with_capacity(2),
            buckets: Vec::new(),
            next: Vec::new(),
            filter: None,
        };
        cache.grow_tables(2);
        cache
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.buckets.len()
    }

    #[inline]
    fn bucket_of(&self, id0: ProxyId, id1: ProxyId) -> usize {
        (pair_hash(id0.raw(), id1.raw()) as usize) & (self.capacity() - 1)
    }

    fn grow_tables(&mut self, capacity: usize) {
        debug_assert!(capacity.is_power_of_two(), "bucket count must stay a power of two");
        if self.buckets.len() >= capacity {
            return;
        }
        self.buckets.clear();
        self.buckets.resize(capacity, NIL);
        self.next.clear();
        self.next.resize(capacity, NIL);
        for (i, pair) in self.pairs.iter().enumerate() {
            let bucket =
                (pair_hash(pair.proxy0.id.raw(), pair.proxy1.id.raw()) as usize) & (capacity - 1);
            self.next[i] = self.buckets[bucket];
            self.buckets[bucket] = i as u32;
        }
    }

    fn find_in_bucket(&self, id0: ProxyId, id1: ProxyId, bucket: usize) -> Option<usize> {
        let mut index = self.buckets[bucket];
        while index != NIL {
            let pair = &self.pairs[index as usize];
            if pair.proxy0.id == id0 && pair.proxy1.id == id1 {
                return Some(index as usize);
            }
            index = self.next[index as usize];
        }
        None
    }

    /// Unlink `pair_index` from `bucket`'s chain.
    fn unlink(&mut self, bucket: usize, pair_index: usize) {
        let mut index = self.buckets[bucket];
        debug_assert!(index != NIL, "pair missing from its hash bucket");
        let mut previous = NIL;
        while index != pair_index as u32 {
            previous = index;
            index = self.next[index as usize];
        }
        if previous != NIL {
            debug_assert_eq!(self.next[previous as usize], pair_index as u32, "hash chain corrupted");
            self.next[previous as usize] = self.next[pair_index];
        } else {
            self.buckets[bucket] = self.next[pair_index];
        }
    }
}

impl PairCache for HashedPairCache {
    fn add_pair(&mut self, a: PairTarget, b: PairTarget) -> Option<usize> {
        if !self.needs_collision(a, b) {
            return None;
        }
        let (p0, p1) = if a.id < b.id { (a, b) } else { (b, a) };
        let bucket = self.bucket_of(p0.id, p1.id);
        if let Some(existing) = self.find_in_bucket(p0.id, p1.id, bucket) {
            return Some(existing);
        }

        let count = self.pairs.len();
        if count == self.capacity() {
            let capacity = self.capacity() * 2;
            self.grow_tables(capacity);
        }
        // Re-derive the bucket: growth changed the mask.
        let bucket = self.bucket_of(p0.id, p1.id);
        self.pairs.push(Pair::new(p0, p1));
        self.next[count] = self.buckets[bucket];
        self.buckets[bucket] = count as u32;
        Some(count)
    }

    fn remove_pair(
        &mut self,
        a: ProxyId,
        b: ProxyId,
        dispatcher: &mut dyn Dispatcher,
    ) -> Option<i32> {
        let (id0, id1) = if a < b { (a, b) } else { (b, a) };
        let bucket = self.bucket_of(id0, id1);
        let pair_index = self.find_in_bucket(id0, id1, bucket)?;

        self.pairs[pair_index].release_algorithm(dispatcher);
        let scratch = self.pairs[pair_index].scratch;

        self.unlink(bucket, pair_index);

        let last_index = self.pairs.len() - 1;
        if last_index == pair_index {
            self.pairs.pop();
            return Some(scratch);
        }

        // Move the tail pair into the freed slot, then repoint the tail's
        // hash chain at the new location. Getting this wrong silently loses
        // pairs, so the chain is re-derived from scratch.
        let last = self.pairs[last_index];
        let last_bucket = self.bucket_of(last.proxy0.id, last.proxy1.id);
        self.unlink(last_bucket, last_index);

        self.pairs[pair_index] = last;
        self.next[pair_index] = self.buckets[last_bucket];
        self.buckets[last_bucket] = pair_index as u32;
        self.pairs.pop();

        Some(scratch)
    }

    fn find_pair(&self, a: ProxyId, b: ProxyId) -> Option<usize> {
        let (id0, id1) = if a < b { (a, b) } else { (b, a) };
        self.find_in_bucket(id0, id1, self.bucket_of(id0, id1))
    }

    fn process_pairs(
        &mut self,
        dispatcher: &mut dyn Dispatcher,
        visit: &mut dyn FnMut(&mut Pair) -> bool,
    ) {
        let mut i = 0;
        while i < self.pairs.len() {
            if visit(&mut self.pairs[i]) {
                let (id0, id1) = self.pairs[i].key();
                self.remove_pair(id0, id1, dispatcher);
            } else {
                i += 1;
            }
        }
    }

    fn process_pairs_with_info(
        &mut self,
        dispatcher: &mut dyn Dispatcher,
        info: &DispatchInfo,
        visit: &mut dyn FnMut(&mut Pair) -> bool,
    ) {
        if !info.deterministic_pairs {
            self.process_pairs(dispatcher, visit);
            return;
        }
        // Visit by canonical key, re-resolving each pair so removals that
        // shuffle the array cannot skip or repeat entries.
        let mut keys: Vec<(ProxyId, ProxyId)> = self.pairs.iter().map(Pair::key).collect();
        keys.sort_unstable();
        for (id0, id1) in keys {
            let Some(index) = self.find_pair(id0, id1) else {
                continue;
            };
            if visit(&mut self.pairs[index]) {
                self.remove_pair(id0, id1, dispatcher);
            }
        }
    }

    fn sort_pairs(&mut self, dispatcher: &mut dyn Dispatcher) {
        let mut pairs: Vec<Pair> = self.pairs.clone();
        pairs.sort_unstable_by_key(Pair::key);
        for pair in &pairs {
            self.remove_pair(pair.proxy0.id, pair.proxy1.id, dispatcher);
        }
        for pair in &pairs {
            self.add_pair(pair.proxy0, pair.proxy1);
        }
    }

    fn pairs(&self) -> &[Pair] {
        &self.pairs
    }

    fn raw_pairs_mut(&mut self) -> &mut Vec<Pair> {
        &mut self.pairs
    }

    fn has_deferred_removal(&self) -> bool {
        false
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
