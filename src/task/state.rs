// Copyright 2025 Paratask Contributors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The packed atomic state word at the heart of every task.
//!
//! All lifecycle changes are expressed as a CAS loop over a single
//! [`State`]: load a [`Snapshot`] once, let a closure decide the next value,
//! and retry on a racing writer. A closure that leaves the snapshot
//! unchanged signals "nothing to do" and the loop returns without a CAS.

use core::sync::atomic::{AtomicU64, Ordering};

bitflags::bitflags! {
    /// Bits describing where a task is in its lifecycle plus a handful of
    /// one-shot flags. Creation options live in a disjoint high range of
    /// the same word (see [`crate::task::options::CreationOptions`]).
    #[derive(Copy, Clone, Eq, PartialEq, Debug)]
    pub struct Flags: u64 {
        const STARTED                    = 1 << 0;
        const DELEGATE_INVOKED           = 1 << 1;
        const DISPOSED                   = 1 << 2;
        const EXCEPTION_OBSERVED_BY_PARENT = 1 << 3;
        const CANCELLATION_ACKNOWLEDGED   = 1 << 4;
        const FAULTED                    = 1 << 5;
        const CANCELED                    = 1 << 6;
        const WAITING_FOR_CHILDREN       = 1 << 7;
        const RAN_TO_COMPLETION          = 1 << 8;
        const WAITING_FOR_ACTIVATION     = 1 << 9;
        const COMPLETION_RESERVED        = 1 << 10;
        const THREAD_WAS_ABORTED         = 1 << 11;
        const CANCELLATION_REQUESTED     = 1 << 12;

        const TERMINAL = Self::FAULTED.bits() | Self::CANCELED.bits() | Self::RAN_TO_COMPLETION.bits();
    }
}

// The three terminal kinds must occupy distinct, non-overlapping bits:
// `commit_terminal`'s caller passes exactly one of them, and `status()`
// distinguishes between them with plain `contains` checks rather than
// priority logic.
static_assertions::const_assert!(Flags::FAULTED.bits() & Flags::CANCELED.bits() == 0);
static_assertions::const_assert!(Flags::FAULTED.bits() & Flags::RAN_TO_COMPLETION.bits() == 0);
static_assertions::const_assert!(Flags::CANCELED.bits() & Flags::RAN_TO_COMPLETION.bits() == 0);
static_assertions::assert_eq_size!(State, AtomicU64);

/// A point-in-time copy of a task's state word. Cheap to copy; mutate it
/// through a [`State::transition`] closure rather than constructing one
/// directly outside of tests.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Snapshot(pub Flags);

impl Snapshot {
    pub fn is_terminal(self) -> bool {
        self.0.intersects(Flags::TERMINAL)
    }

    pub fn contains(self, flags: Flags) -> bool {
        self.0.contains(flags)
    }

    pub fn insert(&mut self, flags: Flags) {
        self.0.insert(flags);
    }
}

/// The atomic state word shared by every handle to a task.
#[derive(Debug)]
pub struct State {
    val: AtomicU64,
}

impl State {
    pub fn new(initial: Flags) -> Self {
        Self { val: AtomicU64::new(initial.bits()) }
    }

    pub fn load(&self) -> Snapshot {
        Snapshot(Flags::from_bits_retain(self.val.load(Ordering::Acquire)))
    }

    /// Applies `transition` to a loaded snapshot, retrying under
    /// contention. If `transition` leaves the snapshot unchanged, no CAS is
    /// attempted and the loop returns immediately; this lets a transition
    /// double as an idempotent no-op check.
    pub fn transition<T>(&self, mut transition: impl FnMut(&mut Snapshot) -> T) -> T {
        let mut current = Snapshot(Flags::from_bits_retain(self.val.load(Ordering::Acquire)));
        loop {
            let mut next = current;
            let out = transition(&mut next);
            if next == current {
                return out;
            }
            match self.val.compare_exchange_weak(
                current.0.bits(),
                next.0.bits(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return out,
                Err(actual) => {
                    current = Snapshot(Flags::from_bits_retain(actual));
                    core::hint::spin_loop();
                }
            }
        }
    }

    /// Sets `STARTED`. Fails if the task is canceled or already terminal.
    pub fn mark_started(&self) -> Result<(), Snapshot> {
        self.transition(|snap| {
            if snap.contains(Flags::CANCELED) || snap.is_terminal() {
                return Err(*snap);
            }
            snap.insert(Flags::STARTED);
            Ok(())
        })
    }

    /// Reserves the right to set a terminal bit. Only one caller per task
    /// will ever observe `Ok` from this.
    pub fn reserve_completion(&self) -> Result<(), Snapshot> {
        self.transition(|snap| {
            if snap.contains(Flags::COMPLETION_RESERVED) || snap.is_terminal() {
                return Err(*snap);
            }
            snap.insert(Flags::COMPLETION_RESERVED);
            Ok(())
        })
    }

    /// Commits a terminal bit after a successful [`reserve_completion`].
    pub fn commit_terminal(&self, terminal: Flags) {
        debug_assert!(Flags::TERMINAL.contains(terminal) && terminal.bits().count_ones() == 1);
        self.transition(|snap| {
            snap.insert(terminal);
        });
    }

    /// Attempts to cancel a task that has not yet started, atomically.
    /// Used by schedulers that report `requires_atomic_start_transition`.
    pub fn try_cancel_before_start(&self) -> bool {
        self.transition(|snap| {
            if snap.contains(Flags::STARTED) || snap.is_terminal() {
                return false;
            }
            snap.insert(Flags::CANCELED | Flags::COMPLETION_RESERVED);
            true
        })
    }

    pub fn request_cancellation(&self) {
        self.transition(|snap| {
            snap.insert(Flags::CANCELLATION_REQUESTED);
        });
    }

    pub fn cancellation_requested(&self) -> bool {
        self.load().contains(Flags::CANCELLATION_REQUESTED)
    }

    pub fn mark_delegate_invoked(&self) -> bool {
        self.transition(|snap| {
            if snap.contains(Flags::DELEGATE_INVOKED) {
                return false;
            }
            snap.insert(Flags::DELEGATE_INVOKED);
            true
        })
    }

    pub fn mark_thread_aborted(&self) {
        self.transition(|snap| {
            snap.insert(Flags::THREAD_WAS_ABORTED);
        });
    }

    pub fn mark_disposed(&self) -> Result<(), Snapshot> {
        self.transition(|snap| {
            if !snap.is_terminal() || snap.contains(Flags::DISPOSED) {
                return Err(*snap);
            }
            snap.insert(Flags::DISPOSED);
            Ok(())
        })
    }

    pub fn mark_exception_observed_by_parent(&self) {
        self.transition(|snap| {
            snap.insert(Flags::EXCEPTION_OBSERVED_BY_PARENT);
        });
    }

    pub fn mark_cancellation_acknowledged(&self) {
        self.transition(|snap| {
            snap.insert(Flags::CANCELLATION_ACKNOWLEDGED);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_then_complete_once() {
        let state = State::new(Flags::empty());
        assert!(state.mark_started().is_ok());
        assert!(state.reserve_completion().is_ok());
        assert!(state.reserve_completion().is_err());
        state.commit_terminal(Flags::RAN_TO_COMPLETION);
        assert!(state.load().is_terminal());
    }

    #[test]
    fn cannot_start_after_cancel_before_start() {
        let state = State::new(Flags::empty());
        assert!(state.try_cancel_before_start());
        assert!(state.mark_started().is_err());
    }

    #[test]
    fn cannot_cancel_before_start_after_started() {
        let state = State::new(Flags::empty());
        assert!(state.mark_started().is_ok());
        assert!(!state.try_cancel_before_start());
    }

    #[test]
    fn only_one_race_winner_reserves_completion() {
        use std::sync::Arc;
        use std::thread;

        let state = Arc::new(State::new(Flags::empty()));
        state.mark_started().unwrap();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let state = state.clone();
                thread::spawn(move || state.reserve_completion().is_ok())
            })
            .collect();
        let wins = handles.into_iter().map(|h| h.join().unwrap()).filter(|ok| *ok).count();
        assert_eq!(wins, 1);
    }
}
