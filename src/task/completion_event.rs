// Copyright 2025 Paratask Contributors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! A one-shot signal every task carries so that waiters can block until it
//! reaches a terminal state.

use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crate::error::WaitError;

#[derive(Debug, Default)]
struct Inner {
    signaled: bool,
    /// Set by [`CompletionEvent::mark_cancelled`] when a waiter's
    /// cancellation token fires first. Never overrides `signaled`: once the
    /// task itself completes, that outcome wins.
    cancelled: bool,
}

#[derive(Debug, Default)]
pub struct CompletionEvent {
    state: Mutex<Inner>,
    condvar: Condvar,
}

impl CompletionEvent {
    pub fn new() -> Self {
        Self { state: Mutex::new(Inner::default()), condvar: Condvar::new() }
    }

    /// Signals the event. Once signaled, it remains signaled for the
    /// lifetime of the task.
    pub fn signal(&self) {
        let mut state = self.state.lock().unwrap();
        state.signaled = true;
        self.condvar.notify_all();
    }

    pub fn is_signaled(&self) -> bool {
        self.state.lock().unwrap().signaled
    }

    pub fn wait(&self) {
        let mut state = self.state.lock().unwrap();
        while !state.signaled {
            state = self.condvar.wait(state).unwrap();
        }
    }

    /// Waits up to `timeout`, returning `true` if the event was signaled
    /// before the timeout elapsed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let state = self.state.lock().unwrap();
        if state.signaled {
            return true;
        }
        let (state, _) = self.condvar.wait_timeout_while(state, timeout, |s| !s.signaled).unwrap();
        state.signaled
    }

    /// Wakes any `wait_cancellable`/`wait_timeout_cancellable` waiter,
    /// recording that the wait's cancellation condition fired. A no-op if
    /// the event is already signaled — a completed task wins the race.
    pub(crate) fn mark_cancelled(&self) {
        let mut state = self.state.lock().unwrap();
        if !state.signaled {
            state.cancelled = true;
        }
        self.condvar.notify_all();
    }

    /// Blocks until signaled or cancelled via [`mark_cancelled`], whichever
    /// happens first.
    pub fn wait_cancellable(&self) -> Result<(), WaitError> {
        let mut state = self.state.lock().unwrap();
        while !state.signaled && !state.cancelled {
            state = self.condvar.wait(state).unwrap();
        }
        if state.signaled {
            Ok(())
        } else {
            Err(WaitError::Cancelled)
        }
    }

    /// Waits up to `timeout` for either the event to signal or
    /// [`mark_cancelled`] to fire. Returns `Ok(true)` on signal, `Ok(false)`
    /// on a plain timeout, `Err` if cancelled first.
    pub fn wait_timeout_cancellable(&self, timeout: Duration) -> Result<bool, WaitError> {
        let state = self.state.lock().unwrap();
        if state.signaled {
            return Ok(true);
        }
        if state.cancelled {
            return Err(WaitError::Cancelled);
        }
        let (state, _) =
            self.condvar.wait_timeout_while(state, timeout, |s| !s.signaled && !s.cancelled).unwrap();
        if state.signaled {
            Ok(true)
        } else if state.cancelled {
            Err(WaitError::Cancelled)
        } else {
            Ok(false)
        }
    }
}
