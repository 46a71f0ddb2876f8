// Copyright 2025 Paratask Contributors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::fmt;

/// A precondition was violated by a call into the task API.
///
/// These never leave a task in a modified state; they are returned
/// immediately to the caller without touching the state word.
#[derive(Debug)]
pub enum TaskError {
    /// The task has already been started once.
    AlreadyStarted,
    /// A continuation task cannot be started directly; it runs when its
    /// antecedent completes.
    IsContinuation,
    /// A promise-style task has no delegate to run.
    NoDelegate,
    /// The task has already reached a terminal state or been disposed.
    AlreadyCompleted,
    /// The task has been disposed.
    Disposed,
    /// `execute_synchronously` and `long_running` were both requested.
    IncompatibleOptions,
    /// The scheduler failed to accept the task.
    Scheduler(SchedulerError),
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskError::AlreadyStarted => f.write_str("task was already started"),
            TaskError::IsContinuation => {
                f.write_str("a continuation task cannot be started directly")
            }
            TaskError::NoDelegate => f.write_str("task has no delegate to run"),
            TaskError::AlreadyCompleted => f.write_str("task has already completed"),
            TaskError::Disposed => f.write_str("task has been disposed"),
            TaskError::IncompatibleOptions => {
                f.write_str("execute_synchronously and long_running are incompatible")
            }
            TaskError::Scheduler(e) => write!(f, "scheduler rejected task: {e}"),
        }
    }
}

impl std::error::Error for TaskError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TaskError::Scheduler(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SchedulerError> for TaskError {
    fn from(e: SchedulerError) -> Self {
        TaskError::Scheduler(e)
    }
}

/// A scheduler collaborator failed to accept a task for execution.
#[derive(Debug)]
pub struct SchedulerError(pub(crate) String);

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for SchedulerError {}

/// The outcome of waiting on a task.
#[derive(Debug)]
pub enum WaitError {
    /// The wait's own cancellation token fired before the task completed.
    Cancelled,
    /// The task faulted; carries the aggregated exception.
    Faulted(AggregateException),
    /// The task itself was canceled.
    TaskCanceled,
}

impl fmt::Display for WaitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitError::Cancelled => f.write_str("wait was cancelled"),
            WaitError::Faulted(e) => write!(f, "task faulted: {e}"),
            WaitError::TaskCanceled => f.write_str("task was canceled"),
        }
    }
}

impl std::error::Error for WaitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WaitError::Faulted(e) => Some(e),
            _ => None,
        }
    }
}

/// Wraps a caught panic payload so it can be recorded in a task's exception
/// aggregator like any other body failure.
#[derive(Debug)]
pub struct PanicException(pub String);

impl fmt::Display for PanicException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task panicked: {}", self.0)
    }
}

impl std::error::Error for PanicException {}

/// A boxed, `Send`-able user exception as recorded by a faulted task body.
pub type BoxedException = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The aggregated set of exceptions recorded against a single task: the
/// task's own body failure (if any) plus any unobserved exceptions folded
/// in from attached children.
#[derive(Debug, Default)]
pub struct AggregateException {
    inner: Vec<BoxedException>,
}

impl AggregateException {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, err: BoxedException) {
        self.inner.push(err);
    }

    pub(crate) fn extend(&mut self, other: AggregateException) {
        self.inner.extend(other.inner);
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn inner(&self) -> &[BoxedException] {
        &self.inner
    }
}

impl fmt::Display for AggregateException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} exception(s): ", self.inner.len())?;
        for (i, e) in self.inner.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{e}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateException {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.first().map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}
