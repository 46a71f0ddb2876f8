// Copyright 2025 Paratask Contributors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Shared flags through which the iterations of a data-parallel loop
//! signal `Stop`/`Break`/`Exceptional`/`Canceled` to each other, plus the
//! lowest iteration index at which a `break` was requested.
//!
//! Two width variants are provided — [`LoopState32`] and [`LoopState64`] —
//! matching loops indexed by `i32` or `i64` respectively; both share the
//! same bit layout and CAS-retry pattern used by [`crate::task::state`].

use std::sync::atomic::{AtomicI32, AtomicI64, Ordering};

bitflags::bitflags! {
    #[derive(Copy, Clone, Eq, PartialEq, Debug)]
    pub struct LoopFlags: u8 {
        const NONE        = 0;
        const EXCEPTIONAL = 1 << 0;
        const BROKEN      = 1 << 1;
        const STOPPED     = 1 << 2;
        const CANCELED    = 1 << 3;
    }
}

/// Returned when an illegal combination was requested (e.g. `stop()` after
/// `break()` already occurred, or vice versa).
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct IllegalLoopTransition;

macro_rules! loop_state_impl {
    ($name:ident, $atomic:ty, $int:ty) => {
        /// See the module documentation.
        #[derive(Debug)]
        pub struct $name {
            flags: $atomic,
            lowest_broken_iteration: $atomic,
        }

        impl $name {
            pub fn new() -> Self {
                Self {
                    flags: <$atomic>::new(LoopFlags::NONE.bits() as $int),
                    lowest_broken_iteration: <$atomic>::new(<$int>::MAX),
                }
            }

            /// Only the low 4 bits of the word are ever written (see
            /// [`LoopFlags`]), so the narrowing to `u8` never truncates a
            /// real bit; the cast lints are about the general case.
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            fn flags_byte(raw: $int) -> u8 {
                (raw & 0b1111) as u8
            }

            pub fn flags(&self) -> LoopFlags {
                LoopFlags::from_bits_retain(Self::flags_byte(self.flags.load(Ordering::Acquire)))
            }

            fn atomic_update(
                &self,
                new_bits: LoopFlags,
                illegal_bits: LoopFlags,
            ) -> Result<(), IllegalLoopTransition> {
                let mut current =
                    LoopFlags::from_bits_retain(Self::flags_byte(self.flags.load(Ordering::Acquire)));
                loop {
                    if current.intersects(illegal_bits) {
                        return Err(IllegalLoopTransition);
                    }
                    let next = current | new_bits;
                    if next == current {
                        return Ok(());
                    }
                    match self.flags.compare_exchange_weak(
                        current.bits() as $int,
                        next.bits() as $int,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    ) {
                        Ok(_) => return Ok(()),
                        Err(actual) => {
                            current = LoopFlags::from_bits_retain(Self::flags_byte(actual));
                            core::hint::spin_loop();
                        }
                    }
                }
            }

            /// Requests a graceful stop. Illegal once `break()` has
            /// already been observed.
            pub fn stop(&self) -> Result<(), IllegalLoopTransition> {
                self.atomic_update(LoopFlags::STOPPED, LoopFlags::BROKEN)
            }

            /// Requests a break at `iteration`. Illegal once `stop()` has
            /// already been observed; idempotent with respect to other
            /// breaks, but always advances the lowest recorded iteration.
            pub fn set_break(&self, iteration: $int) -> Result<(), IllegalLoopTransition> {
                self.atomic_update(
                    LoopFlags::BROKEN,
                    LoopFlags::STOPPED | LoopFlags::EXCEPTIONAL | LoopFlags::CANCELED,
                )?;
                let mut current = self.lowest_broken_iteration.load(Ordering::Acquire);
                while iteration < current {
                    match self.lowest_broken_iteration.compare_exchange_weak(
                        current,
                        iteration,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    ) {
                        Ok(_) => break,
                        Err(actual) => current = actual,
                    }
                }
                Ok(())
            }

            pub fn set_exceptional(&self) {
                let _ = self.atomic_update(LoopFlags::EXCEPTIONAL, LoopFlags::NONE);
            }

            pub fn cancel(&self) {
                let _ = self.atomic_update(LoopFlags::CANCELED, LoopFlags::NONE);
            }

            /// The lowest iteration at which `break` was requested, if
            /// any. Monotonically non-increasing over the life of the
            /// loop state.
            pub fn lowest_broken_iteration(&self) -> Option<$int> {
                let value = self.lowest_broken_iteration.load(Ordering::Acquire);
                if value == <$int>::MAX {
                    None
                } else {
                    Some(value)
                }
            }

            /// Whether iteration `i` should still run given the current
            /// flags: stopped/canceled/exceptional loops admit no further
            /// iterations at all, while a break only excludes iterations
            /// at or beyond the lowest broken index.
            pub fn should_exit_before(&self, iteration: $int) -> bool {
                let flags = self.flags();
                if flags.intersects(LoopFlags::STOPPED | LoopFlags::CANCELED | LoopFlags::EXCEPTIONAL) {
                    return true;
                }
                matches!(self.lowest_broken_iteration(), Some(lowest) if iteration >= lowest)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }
    };
}

loop_state_impl!(LoopState32, AtomicI32, i32);
loop_state_impl!(LoopState64, AtomicI64, i64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_then_break_is_illegal() {
        let state = LoopState32::new();
        state.stop().unwrap();
        assert_eq!(state.set_break(3), Err(IllegalLoopTransition));
    }

    #[test]
    fn break_then_stop_is_illegal() {
        let state = LoopState32::new();
        state.set_break(3).unwrap();
        assert_eq!(state.stop(), Err(IllegalLoopTransition));
    }

    #[test]
    fn lowest_broken_iteration_is_monotonically_non_increasing() {
        let state = LoopState64::new();
        state.set_break(10).unwrap();
        assert_eq!(state.lowest_broken_iteration(), Some(10));
        state.set_break(3).unwrap();
        assert_eq!(state.lowest_broken_iteration(), Some(3));
        state.set_break(7).unwrap();
        assert_eq!(state.lowest_broken_iteration(), Some(3));
    }

    #[test]
    fn should_exit_before_respects_break_threshold() {
        let state = LoopState32::new();
        state.set_break(5).unwrap();
        assert!(!state.should_exit_before(4));
        assert!(state.should_exit_before(5));
        assert!(state.should_exit_before(6));
    }

    #[test]
    fn no_flags_means_never_exit() {
        let state = LoopState32::new();
        assert!(!state.should_exit_before(0));
        assert!(!state.should_exit_before(i32::MAX));
    }
}
