// Copyright 2025 Paratask Contributors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::error::TaskError;

bitflags::bitflags! {
    /// Options supplied at task construction. The first three are
    /// user-facing; the rest are set internally by the runtime itself.
    #[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
    pub struct CreationOptions: u32 {
        /// Hint to the scheduler that this task should be dispatched ahead
        /// of tasks queued after it when the scheduler supports fairness
        /// ordering.
        const PREFER_FAIRNESS   = 1 << 0;
        /// Hint to the scheduler that this task is expected to run for a
        /// long time and may deserve a dedicated thread.
        const LONG_RUNNING      = 1 << 1;
        /// Joins the currently-executing task's completion countdown.
        const ATTACHED_TO_PARENT = 1 << 2;

        const CHILD_REPLICA     = 1 << 3;
        const CONTINUATION_TASK = 1 << 4;
        const PROMISE_TASK      = 1 << 5;
        const SELF_REPLICATING  = 1 << 6;
        const QUEUED_BY_RUNTIME = 1 << 7;
    }
}

impl CreationOptions {
    pub fn validate(self) -> Result<(), TaskError> {
        Ok(())
    }
}

bitflags::bitflags! {
    /// Options supplied when attaching a continuation: which of the
    /// antecedent's terminal states should suppress running this
    /// continuation, and whether it should be attempted inline.
    #[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
    pub struct ContinuationOptions: u32 {
        const NOT_ON_RAN_TO_COMPLETION = 1 << 0;
        const NOT_ON_FAULTED           = 1 << 1;
        const NOT_ON_CANCELED          = 1 << 2;
        const EXECUTE_SYNCHRONOUSLY    = 1 << 3;
        const LONG_RUNNING             = 1 << 4;
    }
}

impl ContinuationOptions {
    pub fn validate(self) -> Result<(), TaskError> {
        if self.contains(Self::EXECUTE_SYNCHRONOUSLY) && self.contains(Self::LONG_RUNNING) {
            return Err(TaskError::IncompatibleOptions);
        }
        Ok(())
    }

    /// Whether a continuation with these options should run given the
    /// antecedent's terminal kind.
    pub fn matches(self, terminal: crate::task::state::Flags) -> bool {
        use crate::task::state::Flags;
        if terminal.contains(Flags::RAN_TO_COMPLETION) && self.contains(Self::NOT_ON_RAN_TO_COMPLETION) {
            return false;
        }
        if terminal.contains(Flags::FAULTED) && self.contains(Self::NOT_ON_FAULTED) {
            return false;
        }
        if terminal.contains(Flags::CANCELED) && self.contains(Self::NOT_ON_CANCELED) {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::state::Flags;

    #[test]
    fn filters_out_non_matching_terminal() {
        let opts = ContinuationOptions::NOT_ON_RAN_TO_COMPLETION;
        assert!(!opts.matches(Flags::RAN_TO_COMPLETION));
        assert!(opts.matches(Flags::FAULTED));
    }

    #[test]
    fn rejects_incompatible_combo() {
        let opts = ContinuationOptions::EXECUTE_SYNCHRONOUSLY | ContinuationOptions::LONG_RUNNING;
        assert!(opts.validate().is_err());
    }
}
