// Copyright 2025 the Bracken Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Bracken Pairs: overlapping pair storage for broad-phase collision
//! detection.
//!
//! A broad-phase produces a superset of the actually-colliding object pairs.
//! This crate owns that set:
//!
//! - [`Pair`]: an unordered, canonicalized pair of proxy ids plus the opaque
//!   narrow-phase state token the external dispatcher attaches to it.
//! - [`PairCache`]: the storage trait, with three implementations:
//!   - [`HashedPairCache`]: the default. A contiguous pair array plus a
//!     chained hash table; constant-time add/find/remove with swap-and-pop
//!     compaction.
//!   - [`SortedPairCache`]: no hash table, linear lookups, deferred removal on
//!     by default. Right when pairs are few and ordered sweeps matter.
//!   - [`NullPairCache`]: every operation is a no-op. Used by ray-cast
//!     accelerator trees that must not pay for pair maintenance.
//! - [`Dispatcher`]: the hooks a narrow-phase dispatcher must provide so the
//!   cache can dispose of per-pair state it does not own.
//!
//! Pair identity is `(id0, id1)` with `id0 < id1`; the cache guarantees at
//! most one live entry per identity (the sorted variant defers the guarantee
//! to its compaction pass).
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

mod cache;
mod dispatch;
mod hashed;
mod sorted;
mod types;

pub use cache::{PairCache, default_needs_collision};
pub use dispatch::{DispatchInfo, Dispatcher, NullDispatcher, OverlapFilter};
pub use hashed::HashedPairCache;
pub use sorted::{NullPairCache, SortedPairCache};
pub use types::{AlgorithmId, FilterGroups, ManifoldId, Pair, PairTarget, ProxyId};
