// Copyright 2025 Paratask Contributors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Public wait utilities layered on top of the task core's completion
//! event and continuation machinery.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use crate::task::{ContinuationOptions, ContinuationTarget, TaskRef};

/// Blocks until every task in `tasks` has reached a terminal state.
pub fn wait_all(tasks: &[TaskRef]) {
    for task in tasks {
        task.wait();
    }
}

/// Blocks until at least one task in `tasks` has reached a terminal state,
/// returning its index. Attaches a lightweight synchronous continuation to
/// each task rather than polling, so the wait resolves as soon as the
/// first antecedent completes.
pub fn wait_any(tasks: &[TaskRef]) -> usize {
    assert!(!tasks.is_empty(), "wait_any requires at least one task");

    for (index, task) in tasks.iter().enumerate() {
        if task.is_completed() {
            return index;
        }
    }

    struct Shared {
        mutex: Mutex<Option<usize>>,
        condvar: Condvar,
        remaining: AtomicUsize,
    }

    let shared = Arc::new(Shared {
        mutex: Mutex::new(None),
        condvar: Condvar::new(),
        remaining: AtomicUsize::new(tasks.len()),
    });

    for (index, task) in tasks.iter().enumerate() {
        let shared = shared.clone();
        let options = ContinuationOptions::EXECUTE_SYNCHRONOUSLY;
        let _ = task.continue_with(
            ContinuationTarget::Callback(Box::new(move |_status| {
                let mut winner = shared.mutex.lock().unwrap();
                if winner.is_none() {
                    *winner = Some(index);
                    shared.condvar.notify_all();
                }
                shared.remaining.fetch_sub(1, Ordering::SeqCst);
            })),
            options,
        );
    }

    let mut winner = shared.mutex.lock().unwrap();
    while winner.is_none() {
        winner = shared.condvar.wait(winner).unwrap();
    }
    winner.unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::SingleThreadScheduler;
    use crate::task::{CreationOptions, Task};
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    #[test]
    fn wait_all_blocks_for_every_task() {
        let scheduler = Arc::new(SingleThreadScheduler::new());
        let flags: Vec<_> = (0..3).map(|_| Arc::new(AtomicBool::new(false))).collect();
        let mut tasks = Vec::new();
        for flag in &flags {
            let flag = flag.clone();
            let task = Task::new(
                Box::new(move || {
                    std::thread::sleep(Duration::from_millis(5));
                    flag.store(true, Ordering::SeqCst);
                    Ok(Box::new(()) as Box<dyn std::any::Any + Send>)
                }),
                CreationOptions::empty(),
            )
            .unwrap();
            task.start(scheduler.clone()).unwrap();
            tasks.push(task);
        }
        wait_all(&tasks);
        for flag in &flags {
            assert!(flag.load(Ordering::SeqCst));
        }
    }

    #[test]
    fn wait_any_returns_first_to_complete() {
        // Each task gets its own dedicated worker so they genuinely race;
        // a shared scheduler would serialize them FIFO and always let the
        // first-enqueued task finish first regardless of body duration.
        let slow = Task::new(
            Box::new(|| {
                std::thread::sleep(Duration::from_millis(50));
                Ok(Box::new(()) as Box<dyn std::any::Any + Send>)
            }),
            CreationOptions::empty(),
        )
        .unwrap();
        let fast = Task::new(
            Box::new(|| Ok(Box::new(()) as Box<dyn std::any::Any + Send>)),
            CreationOptions::empty(),
        )
        .unwrap();
        slow.start(Arc::new(SingleThreadScheduler::new())).unwrap();
        fast.start(Arc::new(SingleThreadScheduler::new())).unwrap();
        let winner = wait_any(&[slow, fast]);
        assert_eq!(winner, 1);
    }
}
