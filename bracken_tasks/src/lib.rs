// Copyright 2025 the Bracken Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Bracken Tasks: the coarse parallelism seam for the Bracken broad-phase.
//!
//! A broad-phase instance is never internally parallel; what *is* worth
//! fanning out is the narrow-phase work driven over the pair list it
//! produces. [`TaskScheduler`] is that seam: hosts hand the pair range to
//! [`TaskScheduler::parallel_for`] with a grain size of their choosing, and
//! plug in whatever thread pool they already run. [`SequentialScheduler`]
//! runs everything inline and is the right default for tests and
//! single-threaded hosts.
//!
//! [`SpinMutex`] is a raw test-and-set lock for the rare shared resource a
//! parallel phase needs to guard (per-worker result lists before a merge).
//! It deliberately guards no data of its own.
//!
//! This crate is `no_std`.

#![no_std]

use core::sync::atomic::{AtomicBool, Ordering};

/// Loop body for [`TaskScheduler::parallel_for`].
pub trait ParallelForBody: Sync {
    /// Process the half-open index range `begin..end`.
    fn for_loop(&self, begin: usize, end: usize);
}

/// Loop body for [`TaskScheduler::parallel_sum`].
pub trait ParallelSumBody: Sync {
    /// Process `begin..end` and return its partial sum.
    fn sum_loop(&self, begin: usize, end: usize) -> f32;
}

/// A pluggable fork-join scheduler.
///
/// Implementations split `begin..end` into chunks of at least `grain`
/// indices and run the body over them, on whatever workers they own. The
/// contract is completion on return; ordering between chunks is unspecified.
pub trait TaskScheduler {
    /// Largest worker count this scheduler could use.
    fn max_thread_count(&self) -> usize;

    /// Worker count currently in use.
    fn thread_count(&self) -> usize;

    /// Run `body` over `begin..end` in chunks of at least `grain`.
    fn parallel_for(&self, begin: usize, end: usize, grain: usize, body: &dyn ParallelForBody);

    /// Run `body` over `begin..end` in chunks of at least `grain` and return
    /// the sum of the partial results.
    fn parallel_sum(&self, begin: usize, end: usize, grain: usize, body: &dyn ParallelSumBody)
    -> f32;
}

/// Runs every body inline on the calling thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct SequentialScheduler;

impl TaskScheduler for SequentialScheduler {
    fn max_thread_count(&self) -> usize {
        1
    }

    fn thread_count(&self) -> usize {
        1
    }

    fn parallel_for(&self, begin: usize, end: usize, _grain: usize, body: &dyn ParallelForBody) {
        if begin < end {
            body.for_loop(begin, end);
        }
    }

    fn parallel_sum(
        &self,
        begin: usize,
        end: usize,
        _grain: usize,
        body: &dyn ParallelSumBody,
    ) -> f32 {
        if begin < end { body.sum_loop(begin, end) } else { 0.0 }
    }
}

/// A test-and-set spin lock.
///
/// Guards no data; pair it with external storage the way the broad-phase
/// pairs it with its ray-stack pool. Spinning is only acceptable because the
/// guarded sections are a few instructions long.
#[derive(Debug, Default)]
pub struct SpinMutex {
    locked: AtomicBool,
}

impl SpinMutex {
    /// Create an unlocked mutex.
    pub const fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
        }
    }

    /// Spin until the lock is acquired.
    pub fn lock(&self) {
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            core::hint::spin_loop();
        }
    }

    /// Try to acquire without spinning.
    pub fn try_lock(&self) -> bool {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Release the lock.
    pub fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::{ParallelForBody, ParallelSumBody, SequentialScheduler, SpinMutex, TaskScheduler};
    use core::sync::atomic::{AtomicUsize, Ordering};

    struct CountBody {
        visited: AtomicUsize,
    }

    impl ParallelForBody for CountBody {
        fn for_loop(&self, begin: usize, end: usize) {
            self.visited.fetch_add(end - begin, Ordering::Relaxed);
        }
    }

    struct RangeSum;

    impl ParallelSumBody for RangeSum {
        fn sum_loop(&self, begin: usize, end: usize) -> f32 {
            (begin..end).map(|i| i as f32).sum()
        }
    }

    #[test]
    fn sequential_for_covers_range_once() {
        let scheduler = SequentialScheduler;
        let body = CountBody {
            visited: AtomicUsize::new(0),
        };
        scheduler.parallel_for(3, 17, 4, &body);
        assert_eq!(body.visited.load(Ordering::Relaxed), 14);
    }

    #[test]
    fn sequential_sum_matches_direct_sum() {
        let scheduler = SequentialScheduler;
        let total = scheduler.parallel_sum(0, 10, 2, &RangeSum);
        assert_eq!(total, 45.0);
    }

    #[test]
    fn empty_ranges_are_no_ops() {
        let scheduler = SequentialScheduler;
        let body = CountBody {
            visited: AtomicUsize::new(0),
        };
        scheduler.parallel_for(5, 5, 1, &body);
        assert_eq!(body.visited.load(Ordering::Relaxed), 0);
        assert_eq!(scheduler.parallel_sum(5, 5, 1, &RangeSum), 0.0);
    }

    #[test]
    fn spin_mutex_excludes_and_releases() {
        let mutex = SpinMutex::new();
        assert!(mutex.try_lock());
        assert!(!mutex.try_lock());
        mutex.unlock();
        assert!(mutex.try_lock());
        mutex.unlock();
        mutex.lock();
        mutex.unlock();
    }
}
