//! The worker thread's run loop.

use std::any::Any;
use std::collections::BTreeMap;
use std::iter;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{self, Ordering};
use std::time::Instant;

use crossbeam::sync::Parker;

use super::task::{Job, Task};
use super::{Shared, WorkerState};
use crate::tracing::internal::{
    enter_worker_span, log_task_executed, log_task_panicked, log_tasks_discarded,
};

/// Runs tasks until the scheduler starts draining, then discards what is left.
pub(super) fn run(shared: &Shared, parker: &Parker) {
    let _span = enter_worker_span(shared.id);
    let mut timers: BTreeMap<(Instant, u64), Task> = BTreeMap::new();

    loop {
        while let Some(task) = shared.inbox.pop() {
            timers.insert(task.key(), task);
        }
        if shared.state().is_shutting_down() {
            break;
        }

        let Some(&(due, _)) = timers.keys().next() else {
            parker.park();
            continue;
        };
        if due > Instant::now() {
            parker.park_deadline(due);
            continue;
        }
        if let Some((_, task)) = timers.pop_first() {
            if let Some(next) = execute(shared, task) {
                timers.insert(next.key(), next);
            }
        }
    }

    // Pairs with the fence in `Scheduler::submit`: a push this drain misses
    // is one whose submitter sees the shutdown and rejects it.
    atomic::fence(Ordering::SeqCst);
    let mut discarded = 0_usize;
    for task in timers.into_values().chain(iter::from_fn(|| shared.inbox.pop())) {
        if task.control.discard() {
            discarded += 1;
        }
    }
    shared.counters.record_discarded(discarded as u64);
    log_tasks_discarded(shared.id, discarded);
    shared.set_state(WorkerState::Stopped);
}

/// Runs one task. Returns the re-armed task for a repeating job that should
/// run again.
fn execute(shared: &Shared, task: Task) -> Option<Task> {
    let Task { job, control, .. } = task;
    if control.is_cancelled() {
        shared.counters.record_cancelled();
        return None;
    }
    if shared.state().is_shutting_down() {
        if control.discard() {
            shared.counters.record_discarded(1);
            log_tasks_discarded(shared.id, 1);
        }
        return None;
    }
    if !control.try_start() {
        // Rejected by its submitter after a concurrent stop.
        return None;
    }

    shared.transition(WorkerState::Idle, WorkerState::Running);

    let next = match job {
        Job::Once(run) => {
            run_isolated(shared, run);
            None
        }
        Job::Repeating { mut run, period } => {
            let returned = run_isolated(shared, &mut run);
            (returned && !control.is_cancelled()).then(|| Task {
                due: Instant::now() + period,
                seq: shared.next_seq(),
                job: Job::Repeating { run, period },
                control,
            })
        }
    };

    shared.transition(WorkerState::Running, WorkerState::Idle);
    next
}

/// Runs `job`, containing any panic. Returns `true` if it returned normally.
fn run_isolated(shared: &Shared, job: impl FnOnce()) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(job)) {
        Ok(()) => {
            shared.counters.record_executed();
            log_task_executed(shared.id);
            true
        }
        Err(payload) => {
            shared.counters.record_panicked();
            log_task_panicked(shared.id, panic_message(payload.as_ref()));
            false
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic payload>")
}
