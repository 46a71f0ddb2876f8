// Copyright 2025 Paratask Contributors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The scheduler collaborator contract, plus a single reference
//! implementation used by this crate's own tests.
//!
//! A scheduler is anything that can accept a runnable task and eventually
//! invoke it exactly once. The task core never spawns threads itself; it
//! always hands work to a `Schedule` implementation.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use crate::error::SchedulerError;

/// A unit of work a scheduler is asked to run. Implemented internally by
/// `Task`; exposed here only as an opaque trait object so `Schedule` does
/// not need to know about task internals.
pub trait Runnable: Send + Sync {
    /// Runs the task body. Called by the scheduler exactly once per
    /// accepted task.
    fn run(self: Arc<Self>);
}

/// The collaborator interface every scheduler implements.
pub trait Schedule: Send + Sync {
    /// Accepts `task` for asynchronous execution. Must eventually call
    /// `task.run()` exactly once unless the task is dequeued first.
    fn enqueue(&self, task: Arc<dyn Runnable>) -> Result<(), SchedulerError>;

    /// Attempts to run `task` synchronously on the calling thread. Returns
    /// `false` without running it if the scheduler refuses (e.g. the
    /// calling thread is not one of its workers).
    fn try_inline(&self, _task: &Arc<dyn Runnable>, _was_previously_queued: bool) -> bool {
        false
    }

    /// Best-effort attempt to remove a previously enqueued task before it
    /// runs. Returns `true` if the task was successfully removed and will
    /// never run.
    fn try_dequeue(&self, _task: &Arc<dyn Runnable>) -> bool {
        false
    }

    /// If `true`, cancellation must CAS the `CANCELED` bit in before the
    /// task starts rather than relying on [`Schedule::try_dequeue`].
    fn requires_atomic_start_transition(&self) -> bool {
        false
    }

    /// An advisory upper bound on how many tasks this scheduler will run
    /// concurrently.
    fn max_concurrency(&self) -> usize {
        usize::MAX
    }
}

enum Message {
    Run(Arc<dyn Runnable>),
    Shutdown,
}

/// A single dedicated worker thread that runs every task handed to it, in
/// order. Mirrors the "one scheduling instance" collaborator used
/// throughout this crate's own test suite: `try_inline` only succeeds when
/// called from within the worker thread itself.
pub struct SingleThreadScheduler {
    sender: mpsc::Sender<Message>,
    worker: Option<thread::JoinHandle<()>>,
}

thread_local! {
    static ON_WORKER: std::cell::Cell<bool> = const { std::cell::Cell::new(false) };
}

impl SingleThreadScheduler {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel::<Message>();
        let worker = thread::Builder::new()
            .name("paratask-worker".into())
            .spawn(move || {
                ON_WORKER.with(|f| f.set(true));
                while let Ok(msg) = receiver.recv() {
                    match msg {
                        Message::Run(task) => {
                            tracing::trace!("single-thread scheduler running task");
                            task.run();
                        }
                        Message::Shutdown => break,
                    }
                }
            })
            .expect("failed to spawn paratask worker thread");
        Self { sender, worker: Some(worker) }
    }
}

impl Default for SingleThreadScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Schedule for SingleThreadScheduler {
    fn enqueue(&self, task: Arc<dyn Runnable>) -> Result<(), SchedulerError> {
        self.sender
            .send(Message::Run(task))
            .map_err(|_| SchedulerError("single-thread scheduler worker has shut down".into()))
    }

    fn try_inline(&self, task: &Arc<dyn Runnable>, _was_previously_queued: bool) -> bool {
        if ON_WORKER.with(|f| f.get()) {
            task.clone().run();
            true
        } else {
            false
        }
    }
}

impl Drop for SingleThreadScheduler {
    fn drop(&mut self) {
        let _ = self.sender.send(Message::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting(Arc<AtomicUsize>);

    impl Runnable for Counting {
        fn run(self: Arc<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn enqueue_runs_task_exactly_once() {
        let scheduler = SingleThreadScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let task: Arc<dyn Runnable> = Arc::new(Counting(counter.clone()));
        scheduler.enqueue(task).unwrap();
        // Give the worker a moment; in real use callers wait on the task's
        // own completion event rather than sleeping.
        for _ in 0..1000 {
            if counter.load(Ordering::SeqCst) == 1 {
                break;
            }
            thread::yield_now();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
