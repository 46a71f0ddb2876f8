// Copyright 2025 Paratask Contributors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

pub mod completion_event;
pub mod contingent;
pub mod continuation;
pub mod options;
pub mod state;
pub mod typed;

use std::any::Any;
use std::cell::RefCell;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use crate::cancellation::CancellationToken;
use crate::error::{AggregateException, BoxedException, PanicException, SchedulerError, TaskError};
use crate::id::Id;
use crate::scheduler::{Runnable, Schedule};
use crate::stack_guard;

pub use continuation::{Continuation, ContinuationTarget};
pub use options::{ContinuationOptions, CreationOptions};
pub use state::Flags;

use completion_event::CompletionEvent;
use contingent::Contingent;

/// A reference-counted handle to a task. Tasks are always accessed through
/// this shared pointer; there is no owned, non-shared `Task`.
pub type TaskRef = Arc<Task>;

type Action = Box<dyn FnOnce() -> Result<Box<dyn Any + Send>, BoxedException> + Send>;

/// The externally observable phase of a task's lifecycle.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum TaskStatus {
    Created,
    WaitingForActivation,
    WaitingToRun,
    Running,
    WaitingForChildrenToComplete,
    RanToCompletion,
    Faulted,
    Canceled,
}

thread_local! {
    static CURRENT_TASK: RefCell<Option<TaskRef>> = const { RefCell::new(None) };
}

/// Returns a clone of the task currently executing on this thread, if any.
pub fn current_task() -> Option<TaskRef> {
    CURRENT_TASK.with(|c| c.borrow().clone())
}

fn set_current_task(task: Option<TaskRef>) -> Option<TaskRef> {
    CURRENT_TASK.with(|c| c.replace(task))
}

/// Temporarily sets the thread's "current task" to `task`, restoring the
/// previous value when the returned guard drops. Outside of a task body
/// (which manages this automatically around `execute`), this is how a
/// caller constructs a group of attached children without actually
/// running inside their parent's delegate.
pub struct CurrentTaskGuard {
    previous: Option<TaskRef>,
}

impl Drop for CurrentTaskGuard {
    fn drop(&mut self) {
        set_current_task(self.previous.take());
    }
}

pub fn enter_as_current(task: TaskRef) -> CurrentTaskGuard {
    CurrentTaskGuard { previous: set_current_task(Some(task)) }
}

/// The task core: a single in-flight (or already finished) unit of
/// asynchronous work. Non-generic; typed producer/consumer handles in
/// [`typed`] wrap a `TaskRef` and downcast its boxed result.
pub struct Task {
    id: Id,
    state: state::State,
    options: CreationOptions,
    contingent: OnceLock<Box<Contingent>>,
    scheduler: OnceLock<Arc<dyn Schedule>>,
    parent: Option<TaskRef>,
    completion_event: CompletionEvent,
    action: Mutex<Option<Action>>,
    result: Mutex<Option<Box<dyn Any + Send>>>,
}

impl Task {
    fn new_raw(
        action: Option<Action>,
        options: CreationOptions,
        cancellation_token: Option<CancellationToken>,
    ) -> TaskRef {
        let parent = if options.contains(CreationOptions::ATTACHED_TO_PARENT) {
            current_task()
        } else {
            None
        };
        let id = Id::next();
        tracing::trace!(task.id = id.as_u64(), ?options, "constructing task");
        let task = Arc::new(Task {
            id,
            state: state::State::new(Flags::empty()),
            options,
            contingent: OnceLock::new(),
            scheduler: OnceLock::new(),
            parent: parent.clone(),
            completion_event: CompletionEvent::new(),
            action: Mutex::new(action),
            result: Mutex::new(None),
        });
        if let Some(token) = cancellation_token {
            task.install_cancellation_token(token);
        }
        if let Some(parent) = &parent {
            parent.add_new_child();
        }
        task
    }

    /// Constructs a task with a delegate to run. The task is not started.
    pub fn new(action: Action, options: CreationOptions) -> Result<TaskRef, TaskError> {
        options.validate()?;
        Ok(Self::new_raw(Some(action), options, None))
    }

    /// Constructs a task with a delegate and a cancellation token that, if
    /// already cancelled or later cancelled, will cancel this task
    /// cooperatively.
    pub fn new_cancellable(
        action: Action,
        options: CreationOptions,
        token: CancellationToken,
    ) -> Result<TaskRef, TaskError> {
        options.validate()?;
        Ok(Self::new_raw(Some(action), options, Some(token)))
    }

    /// Constructs a promise-style task with no delegate; its terminal state
    /// is set externally through [`typed::TaskCompletionSource`].
    pub fn new_promise(options: CreationOptions) -> TaskRef {
        let options = options | CreationOptions::PROMISE_TASK;
        Self::new_raw(None, options, None)
    }

    pub fn id(&self) -> Id {
        self.id
    }

    pub fn options(&self) -> CreationOptions {
        self.options
    }

    fn contingent(&self) -> &Contingent {
        self.contingent.get_or_init(|| Box::new(Contingent::new(CancellationToken::none())))
    }

    fn install_cancellation_token(self: &Arc<Self>, token: CancellationToken) {
        let already_cancelled = token.is_cancelled();
        let contingent = self.contingent.get_or_init(|| Box::new(Contingent::new(token.clone())));
        let _ = contingent;
        if already_cancelled {
            self.state.request_cancellation();
            return;
        }
        let weak = Arc::downgrade(self);
        let registration = token.register(move || {
            if let Some(task) = weak.upgrade() {
                task.cancel();
            }
        });
        *self.contingent().cancellation_registration.lock().unwrap() = Some(registration);
    }

    pub fn status(&self) -> TaskStatus {
        let snapshot = self.state.load();
        if snapshot.contains(Flags::RAN_TO_COMPLETION) {
            TaskStatus::RanToCompletion
        } else if snapshot.contains(Flags::FAULTED) {
            TaskStatus::Faulted
        } else if snapshot.contains(Flags::CANCELED) {
            TaskStatus::Canceled
        } else if snapshot.contains(Flags::WAITING_FOR_CHILDREN) {
            TaskStatus::WaitingForChildrenToComplete
        } else if snapshot.contains(Flags::DELEGATE_INVOKED) {
            TaskStatus::Running
        } else if snapshot.contains(Flags::STARTED) {
            TaskStatus::WaitingToRun
        } else if self.options.contains(CreationOptions::PROMISE_TASK) {
            TaskStatus::WaitingForActivation
        } else {
            TaskStatus::Created
        }
    }

    pub fn is_completed(&self) -> bool {
        self.state.load().is_terminal()
    }

    /// Starts the task on `scheduler`. Fails if the task is a continuation,
    /// has no delegate, or has already been started.
    pub fn start(self: &Arc<Self>, scheduler: Arc<dyn Schedule>) -> Result<(), TaskError> {
        if self.options.contains(CreationOptions::CONTINUATION_TASK) {
            return Err(TaskError::IsContinuation);
        }
        if self.options.contains(CreationOptions::PROMISE_TASK) {
            return Err(TaskError::NoDelegate);
        }
        self.scheduler.set(scheduler.clone()).map_err(|_| TaskError::AlreadyStarted)?;
        self.state.mark_started().map_err(|_| TaskError::AlreadyStarted)?;
        tracing::debug!(task.id = self.id.as_u64(), "starting task");
        let runnable: Arc<dyn Runnable> = self.clone();
        if let Err(e) = scheduler.enqueue(runnable) {
            self.fail_with_scheduler_error(&e);
            return Err(TaskError::Scheduler(e));
        }
        Ok(())
    }

    /// Starts the task, first attempting to run it inline on the calling
    /// thread via the scheduler's `try_inline`; falls back to `enqueue` +
    /// blocking wait if the scheduler refuses.
    pub fn run_synchronously(self: &Arc<Self>, scheduler: Arc<dyn Schedule>) -> Result<(), TaskError> {
        if self.options.contains(CreationOptions::CONTINUATION_TASK) {
            return Err(TaskError::IsContinuation);
        }
        if self.options.contains(CreationOptions::PROMISE_TASK) {
            return Err(TaskError::NoDelegate);
        }
        self.scheduler.set(scheduler.clone()).map_err(|_| TaskError::AlreadyStarted)?;
        self.state.mark_started().map_err(|_| TaskError::AlreadyStarted)?;
        let runnable: Arc<dyn Runnable> = self.clone();
        if scheduler.try_inline(&runnable, false) {
            return Ok(());
        }
        if let Err(e) = scheduler.enqueue(runnable) {
            self.fail_with_scheduler_error(&e);
            return Err(TaskError::Scheduler(e));
        }
        self.wait();
        Ok(())
    }

    fn fail_with_scheduler_error(self: &Arc<Self>, err: &SchedulerError) {
        self.contingent()
            .exception
            .lock()
            .unwrap()
            .push(Box::new(SchedulerError(err.0.clone())));
        self.finish_delegate();
    }

    fn execute(self: &Arc<Self>) {
        if !self.state.mark_delegate_invoked() {
            return;
        }
        let cancelled = self.state.cancellation_requested()
            || self.contingent.get().map(|c| c.cancellation_token.is_cancelled()).unwrap_or(false);
        if cancelled {
            self.state.mark_cancellation_acknowledged();
            self.finish_delegate();
            return;
        }

        let span = tracing::trace_span!("task", task.id = self.id.as_u64());
        let _enter = span.enter();

        let action = self.action.lock().unwrap().take();
        let Some(action) = action else {
            self.finish_delegate();
            return;
        };

        let prev = set_current_task(Some(self.clone()));
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(action));
        set_current_task(prev);

        match outcome {
            Ok(Ok(value)) => {
                *self.result.lock().unwrap() = Some(value);
            }
            Ok(Err(exception)) => {
                tracing::trace!(task.id = self.id.as_u64(), "task body returned an exception");
                self.contingent().exception.lock().unwrap().push(exception);
            }
            Err(panic) => {
                let message = panic_message(&panic);
                tracing::warn!(task.id = self.id.as_u64(), %message, "task body panicked");
                self.contingent().exception.lock().unwrap().push(Box::new(PanicException(message)));
            }
        }
        self.finish_delegate();
    }

    fn finish_delegate(self: &Arc<Self>) {
        let remaining = self.contingent().child_count.fetch_sub(1, std::sync::atomic::Ordering::AcqRel) - 1;
        if remaining == 0 {
            self.finalize();
        } else {
            self.state.transition(|s| s.insert(Flags::WAITING_FOR_CHILDREN));
        }
    }

    fn add_new_child(self: &Arc<Self>) {
        self.contingent().child_count.fetch_add(1, std::sync::atomic::Ordering::AcqRel);
    }

    fn process_child_completion(self: &Arc<Self>, child: TaskRef) {
        if child.status() == TaskStatus::Faulted
            && !child.state.load().contains(Flags::EXCEPTION_OBSERVED_BY_PARENT)
        {
            self.contingent().exceptional_children.lock().unwrap().push(child.clone());
        }
        let remaining = self.contingent().child_count.fetch_sub(1, std::sync::atomic::Ordering::AcqRel) - 1;
        if remaining == 0 {
            self.finalize();
        }
    }

    fn finalize(self: &Arc<Self>) {
        if let Some(contingent) = self.contingent.get() {
            let exceptional = std::mem::take(&mut *contingent.exceptional_children.lock().unwrap());
            if !exceptional.is_empty() {
                let mut aggregate = contingent.exception.lock().unwrap();
                for child in exceptional {
                    if let Some(child_contingent) = child.contingent.get() {
                        let child_exception =
                            std::mem::take(&mut *child_contingent.exception.lock().unwrap());
                        aggregate.extend(child_exception);
                    }
                }
            }
        }

        if self.state.reserve_completion().is_err() {
            return;
        }

        let has_exception =
            self.contingent.get().map(|c| !c.exception.lock().unwrap().is_empty()).unwrap_or(false);
        let terminal = if has_exception {
            Flags::FAULTED
        } else if self.state.cancellation_requested()
            && self.state.load().contains(Flags::CANCELLATION_ACKNOWLEDGED)
        {
            Flags::CANCELED
        } else {
            Flags::RAN_TO_COMPLETION
        };
        self.state.commit_terminal(terminal);
        tracing::debug!(task.id = self.id.as_u64(), ?terminal, "task reached terminal state");
        self.completion_event.signal();

        if let Some(contingent) = self.contingent.get() {
            if let Some(registration) = contingent.cancellation_registration.lock().unwrap().take() {
                registration.deregister();
            }
        }

        if self.options.contains(CreationOptions::ATTACHED_TO_PARENT) {
            if let Some(parent) = &self.parent {
                parent.process_child_completion(self.clone());
            }
        }

        self.drain_continuations(terminal);
        *self.action.lock().unwrap() = None;
    }

    /// Cancels the task cooperatively: dequeues it from its scheduler if
    /// possible, CASes `CANCELED` in before start if the scheduler requires
    /// an atomic start transition, or else marks cancellation requested for
    /// the running body to observe.
    pub fn cancel(self: &Arc<Self>) -> bool {
        self.state.request_cancellation();
        if let Some(scheduler) = self.scheduler.get().cloned() {
            let runnable: Arc<dyn Runnable> = self.clone();
            if scheduler.try_dequeue(&runnable) {
                self.complete_canceled_without_running();
                return true;
            }
            if scheduler.requires_atomic_start_transition() && self.state.try_cancel_before_start() {
                self.complete_canceled_without_running();
                return true;
            }
            false
        } else if self.state.try_cancel_before_start() {
            self.complete_canceled_without_running();
            true
        } else {
            false
        }
    }

    fn complete_canceled_without_running(self: &Arc<Self>) {
        self.state.mark_cancellation_acknowledged();
        if self.state.load().contains(Flags::COMPLETION_RESERVED) {
            // try_cancel_before_start already reserved completion for us.
        } else if self.state.reserve_completion().is_err() {
            return;
        }
        self.state.commit_terminal(Flags::CANCELED);
        self.completion_event.signal();
        if let Some(contingent) = self.contingent.get() {
            if let Some(registration) = contingent.cancellation_registration.lock().unwrap().take() {
                registration.deregister();
            }
        }
        if self.options.contains(CreationOptions::ATTACHED_TO_PARENT) {
            if let Some(parent) = &self.parent {
                parent.process_child_completion(self.clone());
            }
        }
        self.drain_continuations(Flags::CANCELED);
    }

    pub fn wait(&self) {
        self.completion_event.wait();
    }

    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.completion_event.wait_timeout(timeout)
    }

    /// Waits for completion, or for `token` to fire first. Returns
    /// `Err(WaitError::Cancelled)` if the token wins the race; the
    /// registration made against `token` is torn down before returning
    /// either way.
    pub fn wait_cancellable(self: &Arc<Self>, token: &CancellationToken) -> Result<(), crate::error::WaitError> {
        if self.is_completed() {
            return Ok(());
        }
        let task = self.clone();
        let registration = token.register(move || task.completion_event.mark_cancelled());
        let result = self.completion_event.wait_cancellable();
        registration.deregister();
        result
    }

    /// Combines [`wait_timeout`](Self::wait_timeout) and
    /// [`wait_cancellable`](Self::wait_cancellable): waits up to `timeout`
    /// for completion, or until `token` fires, whichever is first.
    pub fn wait_timeout_cancellable(
        self: &Arc<Self>,
        timeout: Duration,
        token: &CancellationToken,
    ) -> Result<bool, crate::error::WaitError> {
        if self.is_completed() {
            return Ok(true);
        }
        let task = self.clone();
        let registration = token.register(move || task.completion_event.mark_cancelled());
        let result = self.completion_event.wait_timeout_cancellable(timeout);
        registration.deregister();
        result
    }

    /// Reads the aggregated exception, if the task is faulted.
    pub fn with_exception<R>(&self, f: impl FnOnce(Option<&AggregateException>) -> R) -> R {
        match self.contingent.get() {
            Some(c) => {
                let guard = c.exception.lock().unwrap();
                if guard.is_empty() {
                    f(None)
                } else {
                    f(Some(&guard))
                }
            }
            None => f(None),
        }
    }

    /// Marks this task's exception as observed by its parent, suppressing
    /// it from being folded into the parent's aggregate a second time.
    pub fn mark_observed_by_parent(&self) {
        self.state.mark_exception_observed_by_parent();
    }

    fn take_result(&self) -> Option<Box<dyn Any + Send>> {
        self.result.lock().unwrap().take()
    }

    /// Attaches a continuation. If this task is already terminal, the
    /// continuation runs immediately (subject to the stack guard).
    pub fn continue_with(
        self: &Arc<Self>,
        target: ContinuationTarget,
        options: ContinuationOptions,
    ) -> Result<(), TaskError> {
        options.validate()?;
        if self.state.load().is_terminal() {
            let terminal = self.state.load().0;
            self.run_continuation_now(target, options, terminal);
            return Ok(());
        }
        let mut continuations = self.contingent().continuations.lock().unwrap();
        if self.state.load().is_terminal() {
            drop(continuations);
            let terminal = self.state.load().0;
            self.run_continuation_now(target, options, terminal);
            return Ok(());
        }
        continuations.push(Continuation { target, options });
        Ok(())
    }

    fn drain_continuations(self: &Arc<Self>, terminal: Flags) {
        let Some(contingent) = self.contingent.get() else { return };
        let continuations = std::mem::take(&mut *contingent.continuations.lock().unwrap());
        let (synchronous, asynchronous): (Vec<_>, Vec<_>) = continuations
            .into_iter()
            .partition(|c| c.options.contains(ContinuationOptions::EXECUTE_SYNCHRONOUSLY));
        for continuation in asynchronous.into_iter().rev() {
            self.run_continuation_now(continuation.target, continuation.options, terminal);
        }
        for continuation in synchronous {
            self.run_continuation_now(continuation.target, continuation.options, terminal);
        }
    }

    fn run_continuation_now(
        self: &Arc<Self>,
        target: ContinuationTarget,
        options: ContinuationOptions,
        terminal: Flags,
    ) {
        if !options.matches(terminal) {
            if let ContinuationTarget::Task(task) = target {
                task.complete_canceled_without_running();
            }
            return;
        }
        match target {
            ContinuationTarget::Task(task) => {
                let want_inline = options.contains(ContinuationOptions::EXECUTE_SYNCHRONOUSLY);
                let may_inline = want_inline
                    && !self.state.load().contains(Flags::THREAD_WAS_ABORTED)
                    && !stack_guard::abort_requested()
                    && stack_guard::may_inline();
                if may_inline {
                    let _guard = stack_guard::enter();
                    let _ = task.scheduler.set(
                        self.scheduler
                            .get()
                            .cloned()
                            .unwrap_or_else(|| Arc::new(crate::scheduler::SingleThreadScheduler::new())),
                    );
                    let _ = task.state.mark_started();
                    task.execute();
                } else if let Some(scheduler) = self.scheduler.get().cloned() {
                    let _ = task.scheduler.set(scheduler.clone());
                    let _ = task.state.mark_started();
                    let runnable: Arc<dyn Runnable> = task.clone();
                    let _ = scheduler.enqueue(runnable);
                } else {
                    let _ = task.state.mark_started();
                    task.execute();
                }
            }
            ContinuationTarget::Callback(callback) => {
                callback(status_from_terminal(terminal));
            }
        }
    }

    pub fn dispose(&self) -> Result<(), TaskError> {
        self.state.mark_disposed().map_err(|_| TaskError::AlreadyCompleted)
    }
}

impl Runnable for Task {
    fn run(self: Arc<Self>) {
        self.execute();
    }
}

fn status_from_terminal(flags: Flags) -> TaskStatus {
    if flags.contains(Flags::RAN_TO_COMPLETION) {
        TaskStatus::RanToCompletion
    } else if flags.contains(Flags::FAULTED) {
        TaskStatus::Faulted
    } else {
        TaskStatus::Canceled
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked with a non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::SingleThreadScheduler;
    use std::sync::atomic::{AtomicI64, Ordering};

    fn action_ok(f: impl FnOnce() -> Box<dyn Any + Send> + Send + 'static) -> Action {
        Box::new(move || Ok(f()))
    }

    #[test]
    fn three_producers_increment_shared_counter() {
        let scheduler = Arc::new(SingleThreadScheduler::new());
        let x = Arc::new(AtomicI64::new(0));
        let mut tasks = Vec::new();
        for _ in 0..3 {
            let x = x.clone();
            let task = Task::new(
                action_ok(move || {
                    x.fetch_add(1, Ordering::SeqCst);
                    Box::new(())
                }),
                CreationOptions::empty(),
            )
            .unwrap();
            task.start(scheduler.clone()).unwrap();
            tasks.push(task);
        }
        for task in &tasks {
            task.wait();
            assert_eq!(task.status(), TaskStatus::RanToCompletion);
        }
        assert_eq!(x.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn body_exception_faults_the_task() {
        let scheduler = Arc::new(SingleThreadScheduler::new());
        let task = Task::new(
            Box::new(|| Err(Box::new(std::io::Error::other("boom")) as BoxedException)),
            CreationOptions::empty(),
        )
        .unwrap();
        task.start(scheduler).unwrap();
        task.wait();
        assert_eq!(task.status(), TaskStatus::Faulted);
        task.with_exception(|e| assert!(e.is_some()));
    }

    #[test]
    fn run_synchronously_rejects_promise_task() {
        let scheduler = Arc::new(SingleThreadScheduler::new());
        let task = Task::new_promise(CreationOptions::empty());
        assert!(matches!(task.run_synchronously(scheduler), Err(TaskError::NoDelegate)));
        assert_eq!(task.status(), TaskStatus::WaitingForActivation);
    }

    #[test]
    fn wait_cancellable_returns_cancelled_before_completion() {
        use crate::cancellation::CancellationTokenSource;

        let task = Task::new_promise(CreationOptions::empty());
        let source = CancellationTokenSource::new();
        let token = source.token();
        source.cancel();
        assert!(matches!(task.wait_cancellable(&token), Err(crate::error::WaitError::Cancelled)));
    }

    #[test]
    fn wait_cancellable_returns_ok_for_already_completed_task() {
        use crate::cancellation::CancellationTokenSource;

        let scheduler = Arc::new(SingleThreadScheduler::new());
        let task = Task::new(action_ok(|| Box::new(())), CreationOptions::empty()).unwrap();
        task.start(scheduler).unwrap();
        task.wait();
        let token = CancellationTokenSource::new().token();
        assert!(task.wait_cancellable(&token).is_ok());
    }

    #[test]
    fn cancel_before_start_with_dequeuing_scheduler() {
        struct DequeueAll;
        impl Schedule for DequeueAll {
            fn enqueue(&self, _task: Arc<dyn Runnable>) -> Result<(), SchedulerError> {
                Ok(())
            }
            fn try_dequeue(&self, _task: &Arc<dyn Runnable>) -> bool {
                true
            }
        }
        let scheduler = Arc::new(DequeueAll);
        let ran = Arc::new(AtomicI64::new(0));
        let ran2 = ran.clone();
        let task = Task::new(
            action_ok(move || {
                ran2.fetch_add(1, Ordering::SeqCst);
                Box::new(())
            }),
            CreationOptions::empty(),
        )
        .unwrap();
        task.start(scheduler).unwrap();
        assert!(task.cancel());
        assert_eq!(task.status(), TaskStatus::Canceled);
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn continuation_filtered_out_transitions_to_canceled() {
        let scheduler = Arc::new(SingleThreadScheduler::new());
        let antecedent = Task::new(action_ok(|| Box::new(())), CreationOptions::empty()).unwrap();
        let continuation = Task::new(action_ok(|| Box::new(())), CreationOptions::CONTINUATION_TASK).unwrap();
        antecedent
            .continue_with(
                ContinuationTarget::Task(continuation.clone()),
                ContinuationOptions::NOT_ON_RAN_TO_COMPLETION,
            )
            .unwrap();
        antecedent.start(scheduler).unwrap();
        antecedent.wait();
        continuation.wait();
        assert_eq!(continuation.status(), TaskStatus::Canceled);
    }

    #[test]
    fn attached_children_fold_exceptions_into_parent() {
        let scheduler = Arc::new(SingleThreadScheduler::new());
        let parent = Task::new(action_ok(|| Box::new(())), CreationOptions::empty()).unwrap();
        let prev = set_current_task(Some(parent.clone()));
        let c1 = Task::new(
            Box::new(|| Err(Box::new(std::io::Error::other("e1")) as BoxedException)),
            CreationOptions::ATTACHED_TO_PARENT,
        )
        .unwrap();
        let c2 = Task::new(
            Box::new(|| Err(Box::new(std::io::Error::other("e2")) as BoxedException)),
            CreationOptions::ATTACHED_TO_PARENT,
        )
        .unwrap();
        let c3 = Task::new(action_ok(|| Box::new(())), CreationOptions::ATTACHED_TO_PARENT).unwrap();
        set_current_task(prev);

        parent.start(scheduler.clone()).unwrap();
        c1.start(scheduler.clone()).unwrap();
        c2.start(scheduler.clone()).unwrap();
        c3.start(scheduler).unwrap();

        parent.wait();
        assert_eq!(parent.status(), TaskStatus::Faulted);
        parent.with_exception(|e| {
            let e = e.unwrap();
            assert_eq!(e.inner().len(), 2);
        });
    }
}
