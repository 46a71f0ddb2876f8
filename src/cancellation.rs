// Copyright 2025 Paratask Contributors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! A minimal, independently-owned cancellation primitive.
//!
//! The task core treats cancellation as an external collaborator: it only
//! needs to register a callback that fires once, and to deregister it again
//! on every terminal transition. [`CancellationToken`] is intentionally small
//! compared to a full async cancellation story; it exists so the crate is
//! self-contained and testable end to end.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

type Callback = Box<dyn FnOnce() + Send>;

struct State {
    cancelled: AtomicBool,
    callbacks: Mutex<Vec<(u64, Option<Callback>)>>,
    next_id: AtomicU64,
}

/// Owns a [`CancellationToken`] and is the only handle that can fire it.
#[derive(Clone)]
pub struct CancellationTokenSource {
    inner: Arc<State>,
}

impl CancellationTokenSource {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(State {
                cancelled: AtomicBool::new(false),
                callbacks: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    pub fn token(&self) -> CancellationToken {
        CancellationToken { inner: self.inner.clone() }
    }

    /// Requests cancellation, invoking every still-registered callback
    /// exactly once. Idempotent: calling this more than once is a no-op
    /// after the first.
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        let callbacks = std::mem::take(&mut *self.inner.callbacks.lock().unwrap());
        for (_, cb) in callbacks {
            if let Some(cb) = cb {
                cb();
            }
        }
    }
}

impl Default for CancellationTokenSource {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancellationTokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationTokenSource")
            .field("cancelled", &self.inner.cancelled.load(Ordering::Relaxed))
            .finish()
    }
}

/// A cheap, `Clone`-able handle to a cancellation signal.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<State>,
}

impl CancellationToken {
    /// A token that can never be cancelled; used by tasks constructed
    /// without a cancellation option.
    pub fn none() -> Self {
        Self {
            inner: Arc::new(State {
                cancelled: AtomicBool::new(false),
                callbacks: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Registers a callback to run when this token is cancelled. If the
    /// token is already cancelled, the callback runs immediately on the
    /// calling thread. Returns a [`Registration`] that deregisters the
    /// callback on drop (invariant: a task deregisters its callback on
    /// every terminal transition).
    pub fn register(&self, callback: impl FnOnce() + Send + 'static) -> Registration {
        if self.is_cancelled() {
            callback();
            return Registration { inner: None };
        }
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let mut callbacks = self.inner.callbacks.lock().unwrap();
        if self.is_cancelled() {
            drop(callbacks);
            callback();
            return Registration { inner: None };
        }
        callbacks.push((id, Some(Box::new(callback))));
        Registration { inner: Some((self.inner.clone(), id)) }
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Deregisters its callback on drop, unless the callback has already run
/// (or the token was already cancelled at registration time).
pub struct Registration {
    inner: Option<(Arc<State>, u64)>,
}

impl Registration {
    pub fn deregister(self) {
        drop(self);
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if let Some((state, id)) = self.inner.take() {
            let mut callbacks = state.callbacks.lock().unwrap();
            callbacks.retain(|(cb_id, _)| *cb_id != id);
        }
    }
}
