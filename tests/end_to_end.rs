// Copyright 2025 Paratask Contributors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::any::Any;
use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use paratask::task::{ContinuationOptions, ContinuationTarget};
use paratask::{CreationOptions, RangeManager, SingleThreadScheduler, Task, TaskStatus};

type BoxedResult = Result<Box<dyn Any + Send>, Box<dyn std::error::Error + Send + Sync>>;

fn ok(value: ()) -> BoxedResult {
    Ok(Box::new(value))
}

#[test]
fn three_tasks_incrementing_shared_counter_each_complete() {
    let scheduler = Arc::new(SingleThreadScheduler::new());
    let x = Arc::new(AtomicI64::new(0));
    let tasks: Vec<_> = (0..3)
        .map(|_| {
            let x = x.clone();
            let task = Task::new(
                Box::new(move || {
                    x.fetch_add(1, Ordering::SeqCst);
                    ok(())
                }),
                CreationOptions::empty(),
            )
            .unwrap();
            task.start(scheduler.clone()).unwrap();
            task
        })
        .collect();

    for task in &tasks {
        task.wait();
        assert_eq!(task.status(), TaskStatus::RanToCompletion);
    }
    assert_eq!(x.load(Ordering::SeqCst), 3);
}

#[test]
fn dequeuable_pending_task_cancels_without_running() {
    struct AlwaysDequeue;
    impl paratask::Schedule for AlwaysDequeue {
        fn enqueue(&self, _task: Arc<dyn paratask::Runnable>) -> Result<(), paratask::SchedulerError> {
            Ok(())
        }
        fn try_dequeue(&self, _task: &Arc<dyn paratask::Runnable>) -> bool {
            true
        }
    }

    let ran = Arc::new(AtomicI64::new(0));
    let ran2 = ran.clone();
    let task = Task::new(
        Box::new(move || {
            ran2.fetch_add(1, Ordering::SeqCst);
            ok(())
        }),
        CreationOptions::empty(),
    )
    .unwrap();
    task.start(Arc::new(AlwaysDequeue)).unwrap();
    assert!(task.cancel());
    assert_eq!(task.status(), TaskStatus::Canceled);
    assert_eq!(ran.load(Ordering::SeqCst), 0);
}

#[test]
fn continuation_not_on_ran_to_completion_is_canceled() {
    let scheduler = Arc::new(SingleThreadScheduler::new());
    let antecedent = Task::new(Box::new(|| ok(())), CreationOptions::empty()).unwrap();
    let ran = Arc::new(AtomicI64::new(0));
    let ran2 = ran.clone();
    let continuation =
        Task::new(Box::new(move || {
            ran2.fetch_add(1, Ordering::SeqCst);
            ok(())
        }), CreationOptions::CONTINUATION_TASK)
        .unwrap();

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
    assert_eq!(ran.load(Ordering::SeqCst), 0);
}

#[test]
fn range_manager_covers_every_index_exactly_once_under_contention() {
    let manager = Arc::new(RangeManager::new(0, 100, 1, 4));
    let seen = Arc::new(std::sync::Mutex::new(HashSet::new()));

    std::thread::scope(|scope| {
        for _ in 0..8 {
            let manager = manager.clone();
            let seen = seen.clone();
            scope.spawn(move || {
                let mut worker = manager.new_worker();
                let mut claims = Vec::new();
                while let Some(range) = worker.find_new_work() {
                    claims.push(range);
                }
                let mut seen = seen.lock().unwrap();
                for (from, to) in claims {
                    for i in from..to {
                        assert!(seen.insert(i), "index {i} claimed by more than one worker");
                    }
                }
            });
        }
    });

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 100);
    assert_eq!(*seen, (0..100).collect());
}

#[test]
fn parent_aggregates_exceptions_from_unobserved_faulted_children() {
    let scheduler = Arc::new(SingleThreadScheduler::new());
    let parent = Task::new(Box::new(|| ok(())), CreationOptions::empty()).unwrap();

    // Attach children while `parent` is the thread's "current" task, the
    // same way a task body would spawn attached children of its own.
    let guard = paratask::task::enter_as_current(parent.clone());
    let c1 = Task::new(
        Box::new(|| Err(Box::new(std::io::Error::other("first")) as _)),
        CreationOptions::ATTACHED_TO_PARENT,
    )
    .unwrap();
    let c2 = Task::new(
        Box::new(|| Err(Box::new(std::io::Error::other("second")) as _)),
        CreationOptions::ATTACHED_TO_PARENT,
    )
    .unwrap();
    let c3 = Task::new(Box::new(|| ok(())), CreationOptions::ATTACHED_TO_PARENT).unwrap();
    drop(guard);

    parent.start(scheduler.clone()).unwrap();
    c1.start(scheduler.clone()).unwrap();
    c2.start(scheduler.clone()).unwrap();
    c3.start(scheduler).unwrap();

    parent.wait();
    assert_eq!(parent.status(), TaskStatus::Faulted);
    parent.with_exception(|exception| {
        let exception = exception.expect("parent should have an aggregated exception");
        assert_eq!(exception.inner().len(), 2);
    });
}
