// Copyright 2025 Paratask Contributors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The rarely-needed per-task fields, allocated lazily on first use rather
//! than carried by every task unconditionally.

use std::sync::atomic::AtomicUsize;
use std::sync::Mutex;

use crate::cancellation::{CancellationToken, Registration};
use crate::error::AggregateException;
use crate::task::continuation::Continuation;
use crate::task::TaskRef;

pub struct Contingent {
    pub cancellation_token: CancellationToken,
    pub cancellation_registration: Mutex<Option<Registration>>,
    pub exception: Mutex<AggregateException>,
    /// Starts at 1 (the task's own delegate); incremented once per attached
    /// child and decremented when the delegate finishes and when each
    /// child completes. Reaching zero triggers finalization.
    pub child_count: AtomicUsize,
    pub continuations: Mutex<Vec<Continuation>>,
    pub exceptional_children: Mutex<Vec<TaskRef>>,
}

impl Contingent {
    pub fn new(cancellation_token: CancellationToken) -> Self {
        Self {
            cancellation_token,
            cancellation_registration: Mutex::new(None),
            exception: Mutex::new(AggregateException::new()),
            child_count: AtomicUsize::new(1),
            continuations: Mutex::new(Vec::new()),
            exceptional_children: Mutex::new(Vec::new()),
        }
    }
}
