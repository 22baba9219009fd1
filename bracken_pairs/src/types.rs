// Copyright 2025 the Bracken Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Core identifiers and the pair record itself.

use crate::dispatch::Dispatcher;

/// Identifier of a broad-phase proxy.
///
/// Ids are unique among live proxies of one broad-phase instance and are what
/// pair identity and canonical ordering are built on. A destroyed proxy's id
/// may be reused once every pair mentioning it has been stripped.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProxyId(u32);

impl ProxyId {
    /// Sentinel id; never names a live proxy.
    pub const INVALID: Self = Self(u32::MAX);

    /// Create an id from its raw index.
    #[inline(always)]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// The raw index.
    #[inline(always)]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Whether this id is not the sentinel.
    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 != u32::MAX
    }
}

/// Opaque token for a narrow-phase algorithm instance. Minted and freed by
/// the host [`Dispatcher`]; the broad-phase only carries it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct AlgorithmId(pub u32);

/// Opaque token for a contact manifold, same ownership story as
/// [`AlgorithmId`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ManifoldId(pub u32);

bitflags::bitflags! {
    /// Collision filter bits carried by every proxy.
    ///
    /// A pair is admitted when each proxy's `group` intersects the other's
    /// `mask`.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct FilterGroups: u32 {
        /// Ordinary dynamic bodies.
        const DEFAULT        = 0x0001;
        /// Static geometry.
        const STATIC         = 0x0002;
        /// Kinematically driven bodies.
        const KINEMATIC      = 0x0004;
        /// Small debris that should not collide with other debris.
        const DEBRIS         = 0x0008;
        /// Sensor volumes that report but do not respond.
        const SENSOR_TRIGGER = 0x0010;
        /// Matches every group.
        const ALL            = !0;
    }
}

impl Default for FilterGroups {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// The filter-relevant view of a proxy that pair cache calls take: its id and
/// filter bits. Broad-phases copy this out of their proxy storage so the
/// cache never has to reach back into it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PairTarget {
    /// Proxy id.
    pub id: ProxyId,
    /// Collision filter group.
    pub group: FilterGroups,
    /// Collision filter mask.
    pub mask: FilterGroups,
}

impl PairTarget {
    /// Sentinel target marking a dead pair slot.
    pub const INVALID: Self = Self {
        id: ProxyId::INVALID,
        group: FilterGroups::ALL,
        mask: FilterGroups::ALL,
    };

    /// Create a target.
    #[inline]
    pub const fn new(id: ProxyId, group: FilterGroups, mask: FilterGroups) -> Self {
        Self { id, group, mask }
    }
}

/// A pair of proxies whose AABBs currently overlap (or did until the next
/// cleanup pass).
///
/// Canonicalized on construction so `proxy0.id < proxy1.id`; that ordering is
/// the pair's identity.
#[derive(Copy, Clone, Debug)]
pub struct Pair {
    /// Lower-id endpoint.
    pub proxy0: PairTarget,
    /// Higher-id endpoint.
    pub proxy1: PairTarget,
    /// Narrow-phase state owned by the dispatcher.
    pub algorithm: Option<AlgorithmId>,
    /// One word of scratch for the host; returned from pair removal.
    pub scratch: i32,
}

impl Pair {
    /// Create a canonicalized pair.
    #[inline]
    pub fn new(a: PairTarget, b: PairTarget) -> Self {
        let (proxy0, proxy1) = if a.id < b.id { (a, b) } else { (b, a) };
        Self {
            proxy0,
            proxy1,
            algorithm: None,
            scratch: 0,
        }
    }

    /// Whether this slot has been marked dead by deferred removal.
    #[inline]
    pub fn is_invalid(&self) -> bool {
        !self.proxy0.id.is_valid()
    }

    /// Whether the pair touches `proxy`.
    #[inline]
    pub fn contains_proxy(&self, proxy: ProxyId) -> bool {
        self.proxy0.id == proxy || self.proxy1.id == proxy
    }

    /// Identity key used for canonical sorts and duplicate detection.
    #[inline]
    pub fn key(&self) -> (ProxyId, ProxyId) {
        (self.proxy0.id, self.proxy1.id)
    }

    /// Hand the pair's narrow-phase state back to the dispatcher, if any.
    #[inline]
    pub fn release_algorithm(&mut self, dispatcher: &mut dyn Dispatcher) {
        if let Some(algorithm) = self.algorithm.take() {
            dispatcher.free_algorithm(algorithm);
        }
    }

    /// Mark the slot dead, to be reclaimed by the owner's next
    /// sort-and-compact pass. The caller is responsible for having released
    /// the algorithm first.
    #[inline]
    pub fn invalidate(&mut self) {
        debug_assert!(self.algorithm.is_none(), "invalidating a pair that still owns narrow-phase state");
        self.proxy0 = PairTarget::INVALID;
        self.proxy1 = PairTarget::INVALID;
    }
}

impl PartialEq for Pair {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

#[cfg(test)]
mod tests {
    use super::{FilterGroups, Pair, PairTarget, ProxyId};

    fn target(id: u32) -> PairTarget {
        PairTarget::new(ProxyId::new(id), FilterGroups::DEFAULT, FilterGroups::ALL)
    }

    #[test]
    fn pairs_canonicalize_by_id() {
        let p = Pair::new(target(7), target(3));
        assert_eq!(p.proxy0.id, ProxyId::new(3));
        assert_eq!(p.proxy1.id, ProxyId::new(7));
        assert_eq!(p, Pair::new(target(3), target(7)));
    }

    #[test]
    fn invalid_slots_are_detectable() {
        let mut p = Pair::new(target(0), target(1));
        assert!(!p.is_invalid());
        p.invalidate();
        assert!(p.is_invalid());
    }

    #[test]
    fn contains_proxy_checks_both_ends() {
        let p = Pair::new(target(2), target(9));
        assert!(p.contains_proxy(ProxyId::new(2)));
        assert!(p.contains_proxy(ProxyId::new(9)));
        assert!(!p.contains_proxy(ProxyId::new(5)));
    }
}
