// Copyright 2025 Paratask Contributors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! A typed producer/consumer pair built over the untyped [`Task`] core.
//!
//! [`TaskCompletionSource`] is the producer: it may only push the task to a
//! terminal state. [`JoinHandle`] is the consumer: it may only read a
//! result, wait, or attach continuations. Splitting the two prevents a
//! consumer from accidentally completing a task it does not own.

use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use crate::cancellation::CancellationToken;
use crate::error::{AggregateException, BoxedException, WaitError};
use crate::id::Id;
use crate::task::options::CreationOptions;
use crate::task::{Task, TaskRef, TaskStatus};

fn downcast<T: 'static>(boxed: Box<dyn Any + Send>) -> T {
    *boxed
        .downcast::<T>()
        .unwrap_or_else(|_| panic!("task result type mismatch"))
}

/// The producer half of a promise-style task.
pub struct TaskCompletionSource<T> {
    task: TaskRef,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + 'static> TaskCompletionSource<T> {
    pub fn new(options: CreationOptions) -> Self {
        Self { task: Task::new_promise(options), _marker: PhantomData }
    }

    pub fn join_handle(&self) -> JoinHandle<T> {
        JoinHandle { task: self.task.clone(), _marker: PhantomData }
    }

    pub fn id(&self) -> Id {
        self.task.id()
    }

    /// Attempts to set the result. Returns `false` if the task was already
    /// terminal.
    pub fn try_set_result(&self, value: T) -> bool {
        if self.task.state.reserve_completion().is_err() {
            return false;
        }
        *self.task.result.lock().unwrap() = Some(Box::new(value));
        self.task.state.commit_terminal(crate::task::Flags::RAN_TO_COMPLETION);
        self.task.completion_event.signal();
        true
    }

    /// Attempts to fault the task with a single exception.
    pub fn try_set_exception(&self, exception: BoxedException) -> bool {
        self.try_set_exceptions(std::iter::once(exception))
    }

    /// Attempts to fault the task with a pre-aggregated enumeration of
    /// exceptions, e.g. when re-raising another task's `AggregateException`.
    pub fn try_set_exceptions(&self, exceptions: impl IntoIterator<Item = BoxedException>) -> bool {
        if self.task.state.reserve_completion().is_err() {
            return false;
        }
        {
            let mut aggregate = self.task.contingent().exception.lock().unwrap();
            for exception in exceptions {
                aggregate.push(exception);
            }
        }
        self.task.state.commit_terminal(crate::task::Flags::FAULTED);
        self.task.completion_event.signal();
        true
    }

    /// Attempts to cancel the task.
    pub fn try_set_canceled(&self) -> bool {
        if self.task.state.reserve_completion().is_err() {
            return false;
        }
        self.task.state.mark_cancellation_acknowledged();
        self.task.state.commit_terminal(crate::task::Flags::CANCELED);
        self.task.completion_event.signal();
        true
    }

    /// Blocking variants that panic if the task is already terminal,
    /// matching the "non-try" operations described for producer handles:
    /// they spin on an acquire-load until the race's winner has finished
    /// committing the terminal state, then assert this call won.
    pub fn set_result(&self, value: T) {
        if !self.try_set_result(value) {
            self.panic_on_lost_race();
        }
    }

    /// Non-"try" form of [`try_set_exception`](Self::try_set_exception).
    pub fn set_exception(&self, exception: BoxedException) {
        if !self.try_set_exception(exception) {
            self.panic_on_lost_race();
        }
    }

    /// Non-"try" form of [`try_set_exceptions`](Self::try_set_exceptions).
    pub fn set_exceptions(&self, exceptions: impl IntoIterator<Item = BoxedException>) {
        if !self.try_set_exceptions(exceptions) {
            self.panic_on_lost_race();
        }
    }

    /// Non-"try" form of [`try_set_canceled`](Self::try_set_canceled).
    pub fn set_canceled(&self) {
        if !self.try_set_canceled() {
            self.panic_on_lost_race();
        }
    }

    fn panic_on_lost_race(&self) {
        while !self.task.is_completed() {
            std::hint::spin_loop();
        }
        panic!("task was already completed");
    }
}

impl<T> Clone for TaskCompletionSource<T> {
    fn clone(&self) -> Self {
        Self { task: self.task.clone(), _marker: PhantomData }
    }
}

/// The consumer half of a task: read-only access to status, result, and
/// continuation attachment.
pub struct JoinHandle<T> {
    task: TaskRef,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + 'static> JoinHandle<T> {
    pub fn from_task(task: TaskRef) -> Self {
        Self { task, _marker: PhantomData }
    }

    pub fn id(&self) -> Id {
        self.task.id()
    }

    pub fn status(&self) -> TaskStatus {
        self.task.status()
    }

    pub fn is_completed(&self) -> bool {
        self.task.is_completed()
    }

    pub fn start(&self, scheduler: Arc<dyn crate::scheduler::Schedule>) -> Result<(), crate::error::TaskError> {
        self.task.start(scheduler)
    }

    pub fn wait(&self) {
        self.task.wait();
    }

    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.task.wait_timeout(timeout)
    }

    /// Waits for completion, or for `token` to fire first.
    pub fn wait_cancellable(&self, token: &CancellationToken) -> Result<(), WaitError> {
        self.task.wait_cancellable(token)
    }

    /// Waits up to `timeout` for completion, or until `token` fires first.
    pub fn wait_timeout_cancellable(&self, timeout: Duration, token: &CancellationToken) -> Result<bool, WaitError> {
        self.task.wait_timeout_cancellable(timeout, token)
    }

    pub fn cancel(&self) -> bool {
        self.task.cancel()
    }

    /// Waits for completion and returns the result, or the aggregated
    /// exception / cancellation as an error. The result (or exception) is
    /// moved out of the task, so this may only be called once per task;
    /// call it from a single owning consumer and `clone()` the `JoinHandle`
    /// before that if other observers only need `status()`/`wait()`.
    pub fn result(&self) -> Result<T, WaitError> {
        self.task.wait();
        match self.task.status() {
            TaskStatus::RanToCompletion => {
                let boxed = self.task.take_result().expect("ran-to-completion task without a result");
                Ok(downcast(boxed))
            }
            TaskStatus::Faulted => {
                let mut aggregate = AggregateException::new();
                if let Some(contingent) = self.task.contingent.get() {
                    let drained = std::mem::take(&mut *contingent.exception.lock().unwrap());
                    aggregate.extend(drained);
                }
                self.task.mark_observed_by_parent();
                Err(WaitError::Faulted(aggregate))
            }
            TaskStatus::Canceled => Err(WaitError::TaskCanceled),
            _ => unreachable!("wait() returned before the task reached a terminal state"),
        }
    }

    pub fn task_ref(&self) -> TaskRef {
        self.task.clone()
    }
}

impl<T> Clone for JoinHandle<T> {
    fn clone(&self) -> Self {
        Self { task: self.task.clone(), _marker: PhantomData }
    }
}
