// Copyright 2025 Paratask Contributors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::task::options::ContinuationOptions;
use crate::task::{TaskRef, TaskStatus};

/// What a continuation runs when its antecedent completes: either another
/// task (driven directly to completion or scheduled) or a plain callback.
pub enum ContinuationTarget {
    Task(TaskRef),
    Callback(Box<dyn FnOnce(TaskStatus) + Send>),
}

pub struct Continuation {
    pub target: ContinuationTarget,
    pub options: ContinuationOptions,
}
