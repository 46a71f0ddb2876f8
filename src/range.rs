// Copyright 2025 Paratask Contributors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Cooperative 1-D range partitioning for data-parallel loops.
//!
//! A [`RangeManager`] divides `[from, to)` into a handful of contiguous
//! subranges up front. Each [`RangeWorker`] then repeatedly claims small,
//! growing chunks of work from whichever subrange it is currently seated
//! on, moving round-robin to the next subrange once its current one is
//! exhausted. No subrange is ever handed to two workers at an overlapping
//! offset.

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

use crate::util::CachePadded;

/// The growth ceiling for a worker's per-claim chunk size, expressed as a
/// multiple of `step`.
const CHUNK_GROWTH_CEILING_MULTIPLE: i64 = 16;

const UNINITIALIZED_OFFSET: i64 = -1;

struct Subrange {
    from: i64,
    to: i64,
    /// Offset from `from`, in units of `step`, already claimed. `-1` means
    /// not yet initialized by any worker.
    offset: CachePadded<AtomicI64>,
    finished: CachePadded<AtomicI64>,
}

/// Divides `[from, to)` into contiguous subranges and hands out claims on
/// them to any number of concurrent [`RangeWorker`]s.
pub struct RangeManager {
    step: i64,
    subranges: Vec<Subrange>,
    next_worker_seat: AtomicUsize,
}

impl RangeManager {
    /// Divides `[from, to)` (exclusive of `to`) into subranges sized for
    /// `expected_workers` concurrent workers, at least two subranges and at
    /// least one `step` wide each.
    pub fn new(from: i64, to: i64, step: i64, expected_workers: usize) -> Self {
        assert!(step > 0, "step must be positive");
        assert!(to >= from, "to must not precede from");

        let total_steps = (to - from + step - 1) / step;
        let num_subranges = i64::try_from(expected_workers.max(2)).unwrap_or(i64::MAX);
        let steps_per_subrange = (total_steps / num_subranges).max(1);

        let mut subranges = Vec::new();
        let mut cursor = from;
        while cursor < to {
            let width = (steps_per_subrange * step).min(to - cursor);
            let end = cursor + width;
            subranges.push(Subrange {
                from: cursor,
                to: end,
                offset: CachePadded::new(AtomicI64::new(UNINITIALIZED_OFFSET)),
                finished: CachePadded::new(AtomicI64::new(0)),
            });
            cursor = end;
        }
        if subranges.is_empty() {
            subranges.push(Subrange {
                from,
                to: from,
                offset: CachePadded::new(AtomicI64::new(UNINITIALIZED_OFFSET)),
                finished: CachePadded::new(AtomicI64::new(1)),
            });
        }

        Self { step, subranges, next_worker_seat: AtomicUsize::new(0) }
    }

    pub fn subrange_count(&self) -> usize {
        self.subranges.len()
    }

    pub fn step(&self) -> i64 {
        self.step
    }

    /// Seats a new [`RangeWorker`], assigning it a starting subrange in
    /// round-robin order across all workers that have ever joined.
    pub fn new_worker(&self) -> RangeWorker<'_> {
        let seat = self.next_worker_seat.fetch_add(1, Ordering::Relaxed) % self.subranges.len();
        RangeWorker {
            manager: self,
            current: seat,
            visited_without_work: 0,
            increment: self.step,
        }
    }

    fn claim(&self, subrange_index: usize, increment: i64) -> Option<(i64, i64)> {
        let subrange = &self.subranges[subrange_index];
        if subrange.finished.load(Ordering::Acquire) != 0 {
            return None;
        }
        let width = subrange.to - subrange.from;

        let reserved_start = subrange
            .offset
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                let base = if current == UNINITIALIZED_OFFSET { 0 } else { current };
                if base >= width {
                    None
                } else {
                    Some(base + increment)
                }
            });

        match reserved_start {
            Ok(prev) => {
                let base = if prev == UNINITIALIZED_OFFSET { 0 } else { prev };
                let claim_from = subrange.from + base;
                let claim_to = subrange.from + (base + increment).min(width);
                if base + increment >= width {
                    subrange.finished.store(1, Ordering::Release);
                }
                Some((claim_from, claim_to))
            }
            Err(_) => {
                subrange.finished.store(1, Ordering::Release);
                None
            }
        }
    }
}

/// One worker's view into a [`RangeManager`]: tracks which subrange it is
/// currently drawing from and how large its next claim should be.
pub struct RangeWorker<'a> {
    manager: &'a RangeManager,
    current: usize,
    visited_without_work: usize,
    increment: i64,
}

impl<'a> RangeWorker<'a> {
    /// Attempts to claim the next chunk of work. Returns `Some((from, to))`
    /// — a half-open interval to iterate sequentially — or `None` once
    /// every subrange has been visited with no work found.
    pub fn find_new_work(&mut self) -> Option<(i64, i64)> {
        let total = self.manager.subranges.len();
        while self.visited_without_work < total {
            if let Some(claim) = self.manager.claim(self.current, self.increment) {
                self.visited_without_work = 0;
                let ceiling = self.manager.step * CHUNK_GROWTH_CEILING_MULTIPLE;
                self.increment = (self.increment * 2).min(ceiling);
                return Some(claim);
            }
            self.current = (self.current + 1) % total;
            self.visited_without_work += 1;
        }
        None
    }
}
